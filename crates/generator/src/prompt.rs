//! Prompt construction and output parsing
//!
//! Providers are asked for strict JSON. Parsing is shared across clients;
//! when a first attempt returns unusable output, the client makes exactly
//! one repair call (`Attempt::Repair`) before giving up permanently.

use crate::{GenerationTask, VariantContent};

/// The two steps of the generate-then-repair state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Try,
    Repair,
}

/// System prompt framing the content task for the platform.
pub fn system_prompt(task: &GenerationTask) -> String {
    let platform_label = match task.platform.as_str() {
        "tiktok" => "TikTok",
        "instagram_reels" => "Instagram Reels",
        "youtube_shorts" => "YouTube Shorts",
        other => other,
    };
    format!(
        "You write short-form video scripts for {platform_label}. \
         Respond with a JSON array of exactly {count} objects, each with \
         fields: \"text\" (the script), \"hashtags\" (array of strings), \
         and \"metadata\" (object with \"hook\", \"benefit\", \"cta\"). \
         Respond with JSON only, no commentary.",
        count = task.variant_count
    )
}

/// User prompt for the first attempt.
pub fn user_prompt(task: &GenerationTask) -> String {
    match (task.is_regen, task.regen_changes.as_deref()) {
        (true, Some(changes)) => format!(
            "Revise the following content request with these changes: {changes}\n\n\
             Original request: {}",
            task.prompt
        ),
        (true, None) => format!(
            "Produce a fresh take on the following content request:\n\n{}",
            task.prompt
        ),
        _ => task.prompt.clone(),
    }
}

/// Prompt for the single repair attempt after unusable output.
pub fn repair_prompt(previous_output: &str) -> String {
    format!(
        "Your previous response was not valid JSON in the required shape. \
         Convert it to a JSON array of objects with fields \"text\", \
         \"hashtags\", and \"metadata\" ({{\"hook\", \"benefit\", \"cta\"}}), \
         preserving the content. Respond with JSON only.\n\n\
         Previous response:\n{previous_output}"
    )
}

/// Parse provider output into variants. Tolerates markdown fences around the
/// JSON but nothing else.
pub fn parse_variants(raw: &str, expected_count: i32) -> Result<Vec<VariantContent>, String> {
    let trimmed = strip_fences(raw.trim());

    let variants: Vec<VariantContent> =
        serde_json::from_str(trimmed).map_err(|e| format!("not a variant array: {}", e))?;

    if variants.is_empty() {
        return Err("provider returned an empty variant array".to_string());
    }
    if variants.len() > expected_count as usize {
        return Err(format!(
            "provider returned {} variants, expected at most {}",
            variants.len(),
            expected_count
        ));
    }
    if variants.iter().any(|v| v.text.trim().is_empty()) {
        return Err("provider returned a variant with empty text".to_string());
    }
    Ok(variants)
}

fn strip_fences(raw: &str) -> &str {
    let Some(inner) = raw.strip_prefix("```") else {
        return raw;
    };
    // Drop an optional language tag on the fence line
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.trim_start_matches(['\r', '\n']);
    inner.strip_suffix("```").map(str::trim).unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcast_plans::Lane;

    fn task(variant_count: i32) -> GenerationTask {
        GenerationTask {
            prompt: "Explain cold brew in 30 seconds".to_string(),
            platform: "tiktok".to_string(),
            variant_count,
            lane: Lane::Interactive,
            is_regen: false,
            regen_type: None,
            regen_changes: None,
            model: "gpt-4o-mini".to_string(),
            max_output_tokens: 2000,
        }
    }

    const GOOD_OUTPUT: &str = r##"[
        {"text": "Cold brew, hot take.", "hashtags": ["#coffee"],
         "metadata": {"hook": "hot take", "benefit": "smooth", "cta": "follow"}}
    ]"##;

    #[test]
    fn test_parse_valid_output() {
        let variants = parse_variants(GOOD_OUTPUT, 1).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].text, "Cold brew, hot take.");
        assert_eq!(variants[0].hashtags, vec!["#coffee"]);
        assert_eq!(variants[0].metadata.hook, "hot take");
    }

    #[test]
    fn test_parse_strips_markdown_fences() {
        let fenced = format!("```json\n{}\n```", GOOD_OUTPUT);
        assert!(parse_variants(&fenced, 1).is_ok());
        let bare_fence = format!("```\n{}\n```", GOOD_OUTPUT);
        assert!(parse_variants(&bare_fence, 1).is_ok());
    }

    #[test]
    fn test_parse_missing_optional_fields() {
        let minimal = r#"[{"text": "Just a script."}]"#;
        let variants = parse_variants(minimal, 1).unwrap();
        assert!(variants[0].hashtags.is_empty());
        assert_eq!(variants[0].metadata.cta, "");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_variants("I'd be happy to help!", 1).is_err());
        assert!(parse_variants("[]", 1).is_err());
        assert!(parse_variants(r#"[{"text": "   "}]"#, 1).is_err());
    }

    #[test]
    fn test_parse_rejects_too_many_variants() {
        let two = r#"[{"text": "a"}, {"text": "b"}]"#;
        assert!(parse_variants(two, 1).is_err());
        assert!(parse_variants(two, 2).is_ok());
    }

    #[test]
    fn test_system_prompt_names_platform_and_count() {
        let p = system_prompt(&task(3));
        assert!(p.contains("TikTok"));
        assert!(p.contains("exactly 3"));
    }

    #[test]
    fn test_user_prompt_for_targeted_regen() {
        let mut t = task(1);
        t.is_regen = true;
        t.regen_changes = Some("make it funnier".to_string());
        let p = user_prompt(&t);
        assert!(p.contains("make it funnier"));
        assert!(p.contains(&t.prompt));
    }

    #[test]
    fn test_user_prompt_for_full_regen() {
        let mut t = task(1);
        t.is_regen = true;
        let p = user_prompt(&t);
        assert!(p.contains("fresh take"));
    }

    #[test]
    fn test_repair_prompt_embeds_previous_output() {
        let p = repair_prompt("some broken { output");
        assert!(p.contains("some broken { output"));
        assert!(p.contains("JSON only"));
    }
}
