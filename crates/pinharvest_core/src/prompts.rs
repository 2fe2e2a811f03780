/// Splits a prompt source into individual prompts.
///
/// Prompts are separated by newlines or commas. Surrounding whitespace is
/// trimmed, blanks are dropped and repeats keep their first position.
pub fn parse_prompts(raw: &str) -> Vec<String> {
    let mut prompts: Vec<String> = Vec::new();
    for candidate in raw.split(['\n', ',']).map(str::trim) {
        if candidate.is_empty() {
            continue;
        }
        if !prompts.iter().any(|existing| existing == candidate) {
            prompts.push(candidate.to_owned());
        }
    }
    prompts
}
