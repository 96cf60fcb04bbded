use anyhow::{Context, Result};
use mindflow_core::prompts::PromptBook;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Reads every `*.md` file in `dir_path`, keyed by file stem.
pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }

        let prompt_key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Could not get file stem for prompt file")?
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

        prompts.insert(prompt_key, content.trim_end().to_string());
    }

    Ok(prompts)
}

/// Built-in prompts, with any templates found in `dir` taking their place.
pub fn prompt_book(dir: Option<&Path>) -> Result<PromptBook> {
    let Some(dir) = dir else {
        return Ok(PromptBook::default());
    };
    let overrides = load_prompts(dir)?;
    tracing::info!("Loaded {} prompt overrides from {}", overrides.len(), dir.display());
    Ok(PromptBook::with_overrides(overrides))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindflow_core::prompts::{COACH_SYSTEM, THEORY_EXPLANATION};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_prompts_reads_markdown_only() -> Result<()> {
        let dir = tempdir()?;
        let dir_path = dir.path();

        // `{{theory}}` is written to the file as `{theory}`.
        let mut file = File::create(dir_path.join("theory_explanation.md"))?;
        writeln!(file, "Spiega in breve: {{theory}}")?;
        let mut ignored = File::create(dir_path.join("notes.txt"))?;
        writeln!(ignored, "not a prompt")?;
        fs::create_dir(dir_path.join("drafts.md"))?;

        let prompts = load_prompts(dir_path)?;

        assert_eq!(prompts.len(), 1);
        assert_eq!(
            prompts.get("theory_explanation").map(String::as_str),
            Some("Spiega in breve: {theory}")
        );
        Ok(())
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = load_prompts(Path::new("nonexistent_dir_for_testing_prompts"));
        assert!(result.is_err());
    }

    #[test]
    fn test_prompt_book_overrides_only_given_templates() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("theory_explanation.md"), "Riassumi: {theory}\n")?;

        let book = prompt_book(Some(dir.path()))?;

        assert_eq!(
            book.render(THEORY_EXPLANATION, &[("theory", "Loci")]),
            "Riassumi: Loci"
        );
        assert_eq!(
            book.template(COACH_SYSTEM),
            PromptBook::default().template(COACH_SYSTEM)
        );
        Ok(())
    }

    #[test]
    fn test_no_directory_means_defaults() -> Result<()> {
        let book = prompt_book(None)?;
        assert!(book.template(THEORY_EXPLANATION).contains("{theory}"));
        Ok(())
    }
}
