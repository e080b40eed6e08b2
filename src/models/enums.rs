use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ResultKind {
    Lab => "LAB",
    Imaging => "IMAGING",
});

str_enum!(InvestigationStatus {
    Ordered => "ordered",
    Completed => "completed",
});

// Provenance marker stored inside the result payload.
str_enum!(SyncSource {
    AutoSync => "auto_sync",
    Manual => "manual",
});

impl ResultKind {
    /// Lenient mapping for model output ("lab", "Imaging", "radiology", ...).
    /// Anything unrecognised is treated as a lab panel.
    pub fn from_model_label(label: &str) -> Self {
        let lower = label.trim().to_ascii_lowercase();
        if lower.starts_with("imag") || lower.starts_with("radio") {
            Self::Imaging
        } else {
            Self::Lab
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn result_kind_round_trips_through_str() {
        assert_eq!(ResultKind::from_str("LAB").unwrap(), ResultKind::Lab);
        assert_eq!(ResultKind::Imaging.as_str(), "IMAGING");
        assert!(ResultKind::from_str("lab").is_err());
    }

    #[test]
    fn result_kind_serializes_uppercase() {
        let json = serde_json::to_string(&ResultKind::Imaging).unwrap();
        assert_eq!(json, "\"IMAGING\"");
    }

    #[test]
    fn model_labels_are_lenient() {
        assert_eq!(ResultKind::from_model_label("imaging"), ResultKind::Imaging);
        assert_eq!(ResultKind::from_model_label(" Radiology "), ResultKind::Imaging);
        assert_eq!(ResultKind::from_model_label("LAB"), ResultKind::Lab);
        assert_eq!(ResultKind::from_model_label("???"), ResultKind::Lab);
    }

    #[test]
    fn sync_source_display() {
        assert_eq!(SyncSource::AutoSync.to_string(), "auto_sync");
    }
}
