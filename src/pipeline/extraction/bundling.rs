//! Arterial blood gas bundling.
//!
//! A blood gas analyser prints pH, gases and electrolytes on one slip. When
//! any panel carries a pH, every parameter in the image belongs to a single
//! ABG investigation, however the model split it. Without a pH, panels are
//! left as the model returned them.

use crate::models::{ExtractedResultItem, ResultKind};

const PH_PARAMETER: &str = "pH";
const ABG_TITLE: &str = "Arterial Blood Gas";

/// Title fragments that already name a blood gas panel.
const BLOOD_GAS_TERMS: &[&str] = &["blood gas", "abg", "vbg"];

fn names_blood_gas(title: &str) -> bool {
    let title = title.to_lowercase();
    BLOOD_GAS_TERMS.iter().any(|term| title.contains(term))
}

pub fn bundle_blood_gas(items: Vec<ExtractedResultItem>) -> Vec<ExtractedResultItem> {
    let Some(abg_index) = items.iter().position(|i| i.has_parameter(PH_PARAMETER)) else {
        return items;
    };
    if items.len() == 1 {
        return items;
    }

    let mut items = items;
    let mut merged = items.remove(abg_index);
    merged.kind = ResultKind::Lab;
    if !names_blood_gas(&merged.title) {
        merged.title = ABG_TITLE.to_string();
    }

    for other in items {
        if merged.date.is_none() {
            merged.date = other.date;
        }
        for (name, value) in other.results {
            if !merged.has_parameter(&name) {
                merged.results.insert(name, value);
            }
        }
    }

    tracing::debug!(
        parameters = merged.results.len(),
        title = %merged.title,
        "Blood gas panels merged into one item"
    );
    vec![merged]
}
