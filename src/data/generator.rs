use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Image generators with a known metadata convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generator {
    #[serde(rename = "AUTOMATIC1111")]
    Automatic1111,
    #[serde(rename = "ComfyUI")]
    ComfyUi,
    #[serde(rename = "Fooocus")]
    Fooocus,
    #[serde(rename = "InvokeAI")]
    InvokeAi,
    #[serde(rename = "NovelAI")]
    NovelAi,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Generator {
    pub const ALL: [Generator; 6] = [
        Self::Automatic1111,
        Self::ComfyUi,
        Self::Fooocus,
        Self::InvokeAi,
        Self::NovelAi,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic1111 => "AUTOMATIC1111",
            Self::ComfyUi => "ComfyUI",
            Self::Fooocus => "Fooocus",
            Self::InvokeAi => "InvokeAI",
            Self::NovelAi => "NovelAI",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Generator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown generator: {wanted}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_generator_names() {
        let json = serde_json::to_string(&Generator::ComfyUi).unwrap();
        assert_eq!(json, "\"ComfyUI\"");
        let g: Generator = serde_json::from_str("\"AUTOMATIC1111\"").unwrap();
        assert_eq!(g, Generator::Automatic1111);
    }

    #[test]
    fn from_str_ignores_case() {
        assert_eq!("novelai".parse::<Generator>(), Ok(Generator::NovelAi));
        assert_eq!(" Fooocus ".parse::<Generator>(), Ok(Generator::Fooocus));
        assert!("midjourney".parse::<Generator>().is_err());
    }
}
