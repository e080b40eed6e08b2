//! Instructions sent with every report image.

pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a clinical laboratory report reader. You read a screenshot of one \
laboratory or imaging report and transcribe its results exactly as printed. \
You never invent values, never convert units and never interpret results.";

/// The blood-gas rule must stay in sync with `bundling::bundle_blood_gas`.
pub const EXTRACTION_USER_PROMPT: &str = "\
Read the report in this image and output ONLY a JSON array. Each element is one test panel:\n\
{\"kind\": \"LAB\" or \"IMAGING\", \"category\": string, \"title\": string, \
\"date\": ISO-8601 date-time of the sample or study if printed, otherwise null, \
\"results\": {parameter name: value with unit exactly as printed}}\n\
Rules:\n\
1. If the report contains a pH value it is an arterial blood gas. Put EVERY parameter in \
the image (including sodium, potassium, chloride, lactate, glucose and any other electrolytes) \
into ONE single panel titled \"Arterial Blood Gas\". Do not split it.\n\
2. Otherwise emit one element per distinct named panel (for example Renal Function, CRP, \
Electrolytes, Complete Blood Count), each with its own results.\n\
3. For imaging reports use kind IMAGING and put the findings and impression text in results.\n\
4. Keep parameter order as printed. Do not wrap the JSON in markdown.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_states_blood_gas_rule() {
        assert!(EXTRACTION_USER_PROMPT.contains("pH"));
        assert!(EXTRACTION_USER_PROMPT.contains("ONE single panel"));
    }

    #[test]
    fn prompt_asks_for_array() {
        assert!(EXTRACTION_USER_PROMPT.contains("JSON array"));
    }
}
