use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every exercise the academy knows about. The serialized form is the
/// identifier used in prompts and in persisted progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExerciseKind {
    // Fluency
    Phonemic,
    Semantic,
    ChainAssociation,
    SpiderAssociation,
    Periphrasis,
    FlashDescription,
    Synonyms,
    Shadowing,
    // Mnemonics
    MnemonicNumbersLearn,
    MnemonicNumbersPingpong,
    MnemonicNumbersTarghe,
    MnemonicLoci,
    MnemonicNames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleKind {
    Fluency,
    Mnemonics,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 13] = [
        ExerciseKind::Phonemic,
        ExerciseKind::Semantic,
        ExerciseKind::ChainAssociation,
        ExerciseKind::SpiderAssociation,
        ExerciseKind::Periphrasis,
        ExerciseKind::FlashDescription,
        ExerciseKind::Synonyms,
        ExerciseKind::Shadowing,
        ExerciseKind::MnemonicNumbersLearn,
        ExerciseKind::MnemonicNumbersPingpong,
        ExerciseKind::MnemonicNumbersTarghe,
        ExerciseKind::MnemonicLoci,
        ExerciseKind::MnemonicNames,
    ];

    pub fn module(self) -> ModuleKind {
        match self {
            ExerciseKind::MnemonicNumbersLearn
            | ExerciseKind::MnemonicNumbersPingpong
            | ExerciseKind::MnemonicNumbersTarghe
            | ExerciseKind::MnemonicLoci
            | ExerciseKind::MnemonicNames => ModuleKind::Mnemonics,
            _ => ModuleKind::Fluency,
        }
    }

    pub fn is_mnemonic(self) -> bool {
        self.module() == ModuleKind::Mnemonics
    }

    /// The identifier sent to the tutor and stored on disk.
    pub fn as_str(self) -> &'static str {
        match self {
            ExerciseKind::Phonemic => "PHONEMIC",
            ExerciseKind::Semantic => "SEMANTIC",
            ExerciseKind::ChainAssociation => "CHAIN_ASSOCIATION",
            ExerciseKind::SpiderAssociation => "SPIDER_ASSOCIATION",
            ExerciseKind::Periphrasis => "PERIPHRASIS",
            ExerciseKind::FlashDescription => "FLASH_DESCRIPTION",
            ExerciseKind::Synonyms => "SYNONYMS",
            ExerciseKind::Shadowing => "SHADOWING",
            ExerciseKind::MnemonicNumbersLearn => "MNEMONIC_NUMBERS_LEARN",
            ExerciseKind::MnemonicNumbersPingpong => "MNEMONIC_NUMBERS_PINGPONG",
            ExerciseKind::MnemonicNumbersTarghe => "MNEMONIC_NUMBERS_TARGHE",
            ExerciseKind::MnemonicLoci => "MNEMONIC_LOCI",
            ExerciseKind::MnemonicNames => "MNEMONIC_NAMES",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown exercise '{0}'")]
pub struct UnknownExercise(pub String);

impl FromStr for ExerciseKind {
    type Err = UnknownExercise;

    // Accepts "PHONEMIC", "phonemic", "mnemonic-loci", ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_uppercase();
        ExerciseKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownExercise(s.to_string()))
    }
}

/// Static catalog entry for one exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseConfig {
    pub kind: ExerciseKind,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    /// Default session length in seconds.
    pub default_time: u32,
    pub min_level: Option<u32>,
    /// Theory shown before a mnemonic practice session.
    pub theory: Option<&'static str>,
}

const fn fluency(
    kind: ExerciseKind,
    title: &'static str,
    description: &'static str,
    icon: &'static str,
    default_time: u32,
) -> ExerciseConfig {
    ExerciseConfig {
        kind,
        title,
        description,
        icon,
        default_time,
        min_level: None,
        theory: None,
    }
}

const fn mnemonic(
    kind: ExerciseKind,
    title: &'static str,
    description: &'static str,
    icon: &'static str,
    default_time: u32,
    theory: &'static str,
) -> ExerciseConfig {
    ExerciseConfig {
        kind,
        title,
        description,
        icon,
        default_time,
        min_level: None,
        theory: Some(theory),
    }
}

static FLUENCY_EXERCISES: [ExerciseConfig; 8] = [
    fluency(
        ExerciseKind::Phonemic,
        "Fluenza Fonemica",
        "Parole che iniziano con una lettera specifica. Stimola l'area frontale.",
        "🔤",
        60,
    ),
    fluency(
        ExerciseKind::Semantic,
        "Fluenza Semantica",
        "Parole per categoria semantica. Stimola il lobo temporale.",
        "🐾",
        60,
    ),
    fluency(
        ExerciseKind::ChainAssociation,
        "Associazioni a Catena",
        "Crea ponti logici tra parole consecutive.",
        "🔗",
        90,
    ),
    fluency(
        ExerciseKind::SpiderAssociation,
        "Il Ragno",
        "Associazioni rapide attorno a un concetto centrale.",
        "🕸️",
        30,
    ),
    fluency(
        ExerciseKind::Periphrasis,
        "Tecnica della Perifrasi",
        "Descrivi oggetti evitando parole ovvie (stile Taboo).",
        "🚫",
        60,
    ),
    fluency(
        ExerciseKind::FlashDescription,
        "Descrizione Flash",
        "Stream of consciousness descrittivo di scene reali.",
        "📸",
        60,
    ),
    fluency(
        ExerciseKind::Synonyms,
        "Sinonimi al Volo",
        "Evoluzione del registro linguistico in tempo reale.",
        "✍️",
        45,
    ),
    fluency(
        ExerciseKind::Shadowing,
        "Shadowing",
        "Ripetizione \"a ombra\" per plasticità neurale.",
        "👥",
        120,
    ),
];

static MNEMONIC_EXERCISES: [ExerciseConfig; 5] = [
    mnemonic(
        ExerciseKind::MnemonicNumbersLearn,
        "1. Apprendimento 1-0",
        "Impara i suoni base della conversione fonetica Leibniz.",
        "🕯️",
        300,
        "### Livello 1: I Fondamenti (1-0)
La conversione fonetica trasforma i numeri (astratti) in suoni consonantici (concreti).

**La Tabella di Riferimento:**
- **1 (T, D):** Una candela o sbarra. Suono dentale.
- **2 (N):** Due gambette verticali. Suono nasale.
- **3 (M):** Tre gambette (M ruotata).
- **4 (R):** La parola \"quattRo\". Suono vibrante.
- **5 (L):** Mano (5 dita) o L romana (50). Suono liquido.
- **6 (C/G dolci):** Il 6 in corsivo ha la pancia come una g.
- **7 (K/G dure):** Linee spigolose, pezzo della K.
- **8 (F/V):** Curve della f corsiva. Suono labio-dentale.
- **9 (P/B):** Speculare alla P o b rovesciata.
- **0 (S/Z):** Parola \"Zero\" o ruota sgonfia (Sssss).",
    ),
    mnemonic(
        ExerciseKind::MnemonicNumbersPingpong,
        "2. Ping-Pong Mentale",
        "Test riflessi rapidi: converti al volo numeri in suoni e viceversa.",
        "🏓",
        200,
        "### Livello 2: Ping-Pong Mentale
Una volta imparati i suoni, devi renderli istantanei. Non devi \"pensare\", devi \"vedere\" il suono.

**L'esercizio:**
Il Tutor dirà un numero (es. \"Cinque\") e tu dovrai rispondere col suono (\"L\").
Poi invertirà: il Tutor dirà un suono (es. \"R\") e tu dirai il numero (\"Quattro\").
L'obiettivo è la velocità di esecuzione.",
    ),
    mnemonic(
        ExerciseKind::MnemonicNumbersTarghe,
        "3. Il Gioco delle Targhe",
        "Crea parole P.A.V. da sequenze numeriche di 2, 3 e 4 cifre.",
        "🚗",
        400,
        "### Livello 3: Creare Parole (Targhe)
Qui trasformiamo i suoni in immagini visualizzabili (P.A.V.: Paradosso, Azione, Vivido).

**Il Metodo:**
Prendi una sequenza (es. 35).
1. Estrai i suoni: 3=M, 5=L.
2. Inserisci vocali: MeLa, MuLo, MieLe.
3. Visualizza: Una MELA gigante che esplode.

**Progressione:**
Inizieremo con 2 cifre guidate, poi passeremo a 3 e 4 cifre per testare la tua creatività mnemonica.",
    ),
    mnemonic(
        ExerciseKind::MnemonicLoci,
        "Palazzo della Memoria",
        "Usa lo spazio per ordinare le informazioni.",
        "🏰",
        400,
        "### Il Palazzo della Memoria (Tecnica dei Loci)
Sfrutta la memoria spaziale (ippocampo) per ordinare i dati.

**Livello Base: Il Palazzo del Corpo**
Usa il tuo corpo come archivio. Esempio spesa: Baguette (sulla testa), Latte (dagli occhi), Batterie (nel naso). Tocca fisicamente le parti per richiamare i dati.

**Livello Intermedio: La Tua Stanza**
Definisci 10 punti fissi in senso orario (Letto, Comodino, Finestra...). Associa un'immagine bizzarra a ogni mobile.

**Livello Avanzato: Il Palazzo Virtuale**
Usa mappe di videogiochi, case di serie TV o Google Street View come archivi infiniti per materie diverse.",
    ),
    mnemonic(
        ExerciseKind::MnemonicNames,
        "Nomi e Volti",
        "Trasforma etichette astratte in immagini vive sul viso.",
        "👤",
        300,
        "### Memorizzare Nomi e Volti
Rendi concreto un nome e \"attaccalo\" al viso.

**Livello Base: Osservazione Selettiva**
Trova un \"difetto\" o caratteristica unica (naso, orecchie, capelli). Costringiti a guardare davvero la persona.

**Livello Intermedio: Trasformazione del Nome**
Trova un sosia visivo per il nome. Marco -> Marco Polo; Silvia -> Selva; Luca -> Lucchetto.

**Livello Avanzato: Il \"Link\" sul Viso**
Unisci caratteristica fisica e immagine del nome con un'azione P.A.V. (Paradosso, Azione, Vivido).
Esempio: Luca (lucchetto) con naso a patata -> Un enorme lucchetto appeso al suo naso.",
    ),
];

pub fn fluency_exercises() -> &'static [ExerciseConfig] {
    &FLUENCY_EXERCISES
}

pub fn mnemonic_exercises() -> &'static [ExerciseConfig] {
    &MNEMONIC_EXERCISES
}

pub fn all_exercises() -> impl Iterator<Item = &'static ExerciseConfig> {
    FLUENCY_EXERCISES.iter().chain(MNEMONIC_EXERCISES.iter())
}

pub fn exercises_for(module: ModuleKind) -> &'static [ExerciseConfig] {
    match module {
        ModuleKind::Fluency => fluency_exercises(),
        ModuleKind::Mnemonics => mnemonic_exercises(),
    }
}

/// Looks up the catalog entry for a kind.
///
/// The catalog tables are declared in the same order as `ExerciseKind`, so
/// the discriminant doubles as the index.
pub fn find(kind: ExerciseKind) -> &'static ExerciseConfig {
    let idx = kind as usize;
    if idx < FLUENCY_EXERCISES.len() {
        &FLUENCY_EXERCISES[idx]
    } else {
        &MNEMONIC_EXERCISES[idx - FLUENCY_EXERCISES.len()]
    }
}
