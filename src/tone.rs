use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rewrite style offered by the enhance menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tone {
    Professional,
    Casual,
    Confident,
    Friendly,
    Concise,
    Creative,
    Formal,
    Informal,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown tone: {0}")]
pub struct UnknownTone(pub String);

impl Tone {
    /// Menu order.
    pub const ALL: [Tone; 8] = [
        Tone::Professional,
        Tone::Casual,
        Tone::Confident,
        Tone::Friendly,
        Tone::Concise,
        Tone::Creative,
        Tone::Formal,
        Tone::Informal,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Tone::Professional => "Professional",
            Tone::Casual => "Casual",
            Tone::Confident => "Confident",
            Tone::Friendly => "Friendly",
            Tone::Concise => "Concise",
            Tone::Creative => "Creative",
            Tone::Formal => "Formal",
            Tone::Informal => "Informal",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Tone {
    type Err = UnknownTone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Tone::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownTone(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eight_distinct_tones() {
        let mut labels: Vec<&str> = Tone::ALL.iter().map(|t| t.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 8);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("professional".parse::<Tone>(), Ok(Tone::Professional));
        assert_eq!(" INFORMAL ".parse::<Tone>(), Ok(Tone::Informal));
        assert_eq!("snarky".parse::<Tone>(), Err(UnknownTone("snarky".into())));
    }

    #[test]
    fn test_serialized_as_label() {
        assert_eq!(serde_json::to_string(&Tone::Casual).unwrap(), "\"Casual\"");
    }
}
