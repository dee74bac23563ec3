//! Extraction prompts for certificates of analysis.
//!
//! Sent to the extraction service alongside the document; the grammar keeps
//! the model's answer inside the JSON shape [`crate::parse_extraction_output`]
//! expects.

/// System prompt for COA extraction.
pub const SYSTEM_PROMPT: &str = r#"You are a laboratory data assistant that reads cannabis certificates of analysis (COAs).

Extract the following from the document:
- lab_name: The testing laboratory
- batch_number: Batch, lot or sample identifier
- test_date: Date tested, as YYYY-MM-DD
- cannabinoids: Each cannabinoid with its percentage by weight
- terpenes: Each terpene with its percentage by weight
- contaminants: Whether pesticides, heavy metals, residual solvents or microbials FAILED, and moisture percentage

Rules:
- Report percentages, not mg/g (10 mg/g = 1%)
- "ND" or "<LOQ" means 0
- Never guess. Use null for anything you cannot read.
- Common names: THCA = Δ9-THC acid, CBDA = CBD acid, β-Myrcene = Myrcene, d-Limonene = Limonene

Output a single JSON object."#;

const RESPONSE_SHAPE: &str = r#"Return a JSON object with:
- lab_name: string or null
- batch_number: string or null
- test_date: "YYYY-MM-DD" or null
- cannabinoids: array of {"name": string, "percent": number}
- terpenes: array of {"name": string, "percent": number}
- contaminants: {"pesticides": bool, "heavy_metals": bool, "residual_solvents": bool, "microbials": bool, "moisture": number or null} where true means the test FAILED"#;

/// User prompt quoting the certificate text.
pub fn make_extraction_prompt(text: &str) -> String {
    format!(
        "Extract the lab results from this certificate of analysis:\n\n\"{}\"\n\n{}",
        text, RESPONSE_SHAPE
    )
}

/// User prompt for a certificate sent as an attachment (scan or PDF).
pub fn make_document_prompt(file_name: &str) -> String {
    format!(
        "Extract the lab results from the attached certificate of analysis (file: {}). \
         Read the values from the attached document only.\n\n{}",
        file_name.trim(),
        RESPONSE_SHAPE
    )
}

/// JSON grammar constraint for the extraction model.
pub const JSON_GRAMMAR: &str = r#"
root ::= "{" ws
    "\"lab_name\"" ws ":" ws (string | "null") ws "," ws
    "\"batch_number\"" ws ":" ws (string | "null") ws "," ws
    "\"test_date\"" ws ":" ws (string | "null") ws "," ws
    "\"cannabinoids\"" ws ":" ws analytes ws "," ws
    "\"terpenes\"" ws ":" ws analytes ws "," ws
    "\"contaminants\"" ws ":" ws contaminants ws
"}"
analytes ::= "[" ws (analyte (ws "," ws analyte)*)? ws "]"
analyte ::= "{" ws "\"name\"" ws ":" ws string ws "," ws "\"percent\"" ws ":" ws number ws "}"
contaminants ::= "{" ws
    "\"pesticides\"" ws ":" ws bool ws "," ws
    "\"heavy_metals\"" ws ":" ws bool ws "," ws
    "\"residual_solvents\"" ws ":" ws bool ws "," ws
    "\"microbials\"" ws ":" ws bool ws "," ws
    "\"moisture\"" ws ":" ws (number | "null") ws
"}"
bool ::= "true" | "false"
string ::= "\"" ([^"\\] | "\\" .)* "\""
number ::= [0-9]+ ("." [0-9]+)?
ws ::= [ \t\n]*
"#;

/// Few-shot examples for better extraction accuracy.
pub const FEW_SHOT_EXAMPLES: &[(&str, &str)] = &[
    (
        "SC Labs  Batch: BD-117  Tested: 03/15/2024\nTHCA 24.1%  Δ9-THC 0.8%  CBD ND\nβ-Myrcene 0.62%  d-Limonene 0.41%\nPesticides PASS  Heavy Metals PASS  Moisture 11.2%",
        r#"{"lab_name":"SC Labs","batch_number":"BD-117","test_date":"2024-03-15","cannabinoids":[{"name":"THCA","percent":24.1},{"name":"THC","percent":0.8},{"name":"CBD","percent":0}],"terpenes":[{"name":"Myrcene","percent":0.62},{"name":"Limonene","percent":0.41}],"contaminants":{"pesticides":false,"heavy_metals":false,"residual_solvents":false,"microbials":false,"moisture":11.2}}"#,
    ),
    (
        "Lot 88-C  CBDA 142.0 mg/g  CBD 8.0 mg/g  Microbials FAIL",
        r#"{"lab_name":null,"batch_number":"88-C","test_date":null,"cannabinoids":[{"name":"CBDA","percent":14.2},{"name":"CBD","percent":0.8}],"terpenes":[],"contaminants":{"pesticides":false,"heavy_metals":false,"residual_solvents":false,"microbials":true,"moisture":null}}"#,
    ),
];

/// Build a complete prompt around the quoted certificate text.
pub fn build_full_prompt(text: &str, include_examples: bool) -> String {
    build_prompt(&make_extraction_prompt(text), include_examples)
}

/// Build a complete prompt for a certificate uploaded as a file; the
/// document itself travels next to the prompt.
pub fn build_document_prompt(file_name: &str, include_examples: bool) -> String {
    build_prompt(&make_document_prompt(file_name), include_examples)
}

fn build_prompt(request: &str, include_examples: bool) -> String {
    let mut prompt = String::new();

    prompt.push_str("<|system|>\n");
    prompt.push_str(SYSTEM_PROMPT);
    prompt.push_str("\n<|end|>\n");

    if include_examples {
        for (input, output) in FEW_SHOT_EXAMPLES {
            prompt.push_str("<|user|>\n");
            prompt.push_str(&make_extraction_prompt(input));
            prompt.push_str("\n<|end|>\n");
            prompt.push_str("<|assistant|>\n");
            prompt.push_str(output);
            prompt.push_str("\n<|end|>\n");
        }
    }

    prompt.push_str("<|user|>\n");
    prompt.push_str(request);
    prompt.push_str("\n<|end|>\n");
    prompt.push_str("<|assistant|>\n");

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_extraction_output;

    #[test]
    fn test_extraction_prompt() {
        let prompt = make_extraction_prompt("Lot 9  THCA 21.0%");
        assert!(prompt.contains("\"Lot 9  THCA 21.0%\""));
        assert!(prompt.contains("batch_number"));
        assert!(prompt.contains("heavy_metals"));
    }

    #[test]
    fn test_full_prompt_with_examples() {
        let prompt = build_full_prompt("THCA 21.0%", true);
        assert!(prompt.contains("<|system|>"));
        assert!(prompt.contains("certificates of analysis"));
        assert!(prompt.contains("BD-117"));
        assert!(prompt.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn test_full_prompt_without_examples() {
        let prompt = build_full_prompt("THCA 21.0%", false);
        assert!(!prompt.contains("BD-117"));
        assert!(prompt.contains("THCA 21.0%"));
    }

    #[test]
    fn test_document_prompt_refers_to_attachment() {
        let prompt = build_document_prompt(" coa-lot-9.pdf ", true);
        let request = prompt
            .rsplit("<|user|>\n")
            .next()
            .unwrap();
        assert!(request.contains("attached certificate of analysis"));
        assert!(request.contains("(file: coa-lot-9.pdf)"));
        assert!(!request.contains("\"coa-lot-9.pdf\""));
        assert!(request.contains("heavy_metals"));
        // Few-shot turns still quote their sample text
        assert!(prompt.contains("BD-117"));
        assert!(prompt.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn test_few_shot_answers_parse() {
        for (_, answer) in FEW_SHOT_EXAMPLES {
            parse_extraction_output(answer).unwrap();
        }
    }
}
