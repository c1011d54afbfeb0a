use super::*;

#[test]
fn test_validate_default_config() {
    let config = Config::default();
    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid(), "{:?}", result.errors);
}

#[test]
fn test_validate_zero_quota() {
    let mut config = Config::default();
    config.automation.images_per_prompt = 0;

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result
        .errors
        .iter()
        .any(|e| e.path == "automation.images_per_prompt"));
}

#[test]
fn test_validate_randomize_without_ratios() {
    let mut config = Config::default();
    config.automation.randomize = true;
    config.automation.aspect_ratios.clear();

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "automation.aspect_ratios"));
}

#[test]
fn test_validate_empty_ratios_ignored_when_not_randomizing() {
    let mut config = Config::default();
    config.automation.aspect_ratios.clear();

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
}

#[test]
fn test_validate_zero_delay_warning() {
    let mut config = Config::default();
    config.automation.delay_seconds = 0;

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.path == "automation.delay_seconds"));
}

#[test]
fn test_validate_prompt_txt_without_auto_download() {
    let mut config = Config::default();
    config.download.save_prompt_txt = true;

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.path == "download.save_prompt_txt"));
}

#[test]
fn test_validate_subfolder_escape() {
    let mut config = Config::default();
    config.download.subfolder = "../outside".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "download.subfolder"));
}

#[test]
fn test_validate_invalid_endpoint() {
    let mut config = Config::default();
    config.browser.endpoint = "localhost:9222".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "browser.endpoint"));
}

#[test]
fn test_validate_empty_selector() {
    let mut config = Config::default();
    config.selectors.submit_button = "  ".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "selectors.submit_button"));
}

#[test]
fn test_validate_zero_timeouts() {
    let mut config = Config::default();
    config.timing.locate_timeout_ms = 0;
    config.timing.staleness_seconds = 0;

    let result = ConfigValidator::validate(&config);
    assert_eq!(
        result
            .errors
            .iter()
            .filter(|e| e.path.starts_with("timing."))
            .count(),
        2
    );
}

#[test]
fn test_validation_result_methods() {
    let mut result = ValidationResult::default();
    assert!(result.is_valid());

    result.add_warning(ValidationWarning::new("path", "warning"));
    assert!(result.is_valid());

    result.add_error(ValidationError::new("path", "error"));
    assert!(!result.is_valid());
}
