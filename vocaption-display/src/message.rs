use serde::{Deserialize, Serialize};

/// Caption update pushed to display clients, one JSON object per line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CaptionMessage {
    /// In-progress recognition text for the current utterance.
    Partial {
        text: String,
        speaker: Option<String>,
    },

    /// Completed utterance.
    Final {
        text: String,
        speaker: Option<String>,
    },
}

impl CaptionMessage {
    pub fn partial(text: impl Into<String>, speaker: Option<String>) -> Self {
        Self::Partial {
            text: text.into(),
            speaker,
        }
    }

    pub fn final_text(text: impl Into<String>, speaker: Option<String>) -> Self {
        Self::Final {
            text: text.into(),
            speaker,
        }
    }

    /// Convert to a JSON string with trailing newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_serialization() {
        let msg = CaptionMessage::partial("hi the", None);
        let json = msg.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"partial\""));
        assert!(json.contains("\"text\":\"hi the\""));
        assert!(json.contains("\"speaker\":null"));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn test_final_serialization_with_speaker() {
        let msg = CaptionMessage::final_text("hi there.", Some("S1".to_string()));
        let json = msg.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"final\""));
        assert!(json.contains("\"speaker\":\"S1\""));
    }

    #[test]
    fn test_round_trip() {
        let msg = CaptionMessage::final_text("done", None);
        let line = msg.to_json_line().unwrap();
        let parsed: CaptionMessage = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed, msg);
    }
}
