use std::collections::HashMap;

use super::*;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_point_at_public_gemini_endpoint() {
    let settings = Settings::default();
    assert_eq!(settings.gemini_api_key, None);
    assert_eq!(settings.gemini_base_url, DEFAULT_BASE_URL);
    assert_eq!(settings.presence_probability, 0.95);
    assert_eq!(settings.gemini_config().api_key, "");
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        r#"
            image_model = "custom-image"
            presence_probability = 0.5
            output_dir = "/tmp/studio"
        "#,
    );
    assert_eq!(settings.image_model, "custom-image");
    assert_eq!(settings.text_model, DEFAULT_TEXT_MODEL);
    assert_eq!(settings.presence_probability, 0.5);
    assert_eq!(settings.output_dir, PathBuf::from("/tmp/studio"));
}

#[test]
fn malformed_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "presence_probability = \"lots\"");
    assert_eq!(settings, Settings::default());
}

#[test]
fn prefixed_env_wins_over_plain_key_and_file() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "gemini_api_key = \"from-file\"");
    apply_env(
        &mut settings,
        env_of(&[
            ("GEMINI_API_KEY", "plain"),
            ("APP__GEMINI_API_KEY", "prefixed"),
            ("APP__GEMINI_BASE_URL", "http://127.0.0.1:9000"),
        ]),
    );
    assert_eq!(settings.gemini_api_key.as_deref(), Some("prefixed"));

    let gemini = settings.gemini_config();
    assert_eq!(gemini.api_key, "prefixed");
    assert_eq!(gemini.base_url, "http://127.0.0.1:9000");
}

#[test]
fn unparsable_probability_and_blank_key_are_dropped() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_of(&[
            ("APP__PRESENCE_PROBABILITY", "often"),
            ("GEMINI_API_KEY", "   "),
        ]),
    );
    assert_eq!(settings.presence_probability, 0.95);
    assert_eq!(settings.gemini_api_key, None);
}
