//! Configuration validation.

use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_automation(config, &mut result);
        Self::validate_download(config, &mut result);
        Self::validate_browser(config, &mut result);
        Self::validate_selectors(config, &mut result);
        Self::validate_timing(config, &mut result);

        result
    }

    fn validate_automation(config: &Config, result: &mut ValidationResult) {
        let automation = &config.automation;

        if automation.images_per_prompt == 0 {
            result.add_error(ValidationError::new(
                "automation.images_per_prompt",
                "images_per_prompt must be at least 1",
            ));
        }

        if automation.images_per_prompt > 8 {
            result.add_warning(ValidationWarning::new(
                "automation.images_per_prompt",
                "images_per_prompt is higher than the page ever renders per prompt",
            ));
        }

        if automation.delay_seconds == 0 {
            result.add_warning(ValidationWarning::new(
                "automation.delay_seconds",
                "delay_seconds is 0, prompts will be submitted back to back",
            ));
        }

        if automation.randomize {
            if automation.aspect_ratios.is_empty() {
                result.add_error(ValidationError::new(
                    "automation.aspect_ratios",
                    "randomize is on but no aspect ratio is selected",
                ));
            }
            if automation.aspect_ratios.iter().any(|r| r.trim().is_empty()) {
                result.add_error(ValidationError::new(
                    "automation.aspect_ratios",
                    "aspect ratio labels cannot be empty",
                ));
            }
        }
    }

    fn validate_download(config: &Config, result: &mut ValidationResult) {
        let download = &config.download;

        if download.save_prompt_txt && !download.auto_download {
            result.add_warning(ValidationWarning::new(
                "download.save_prompt_txt",
                "save_prompt_txt has no effect while auto_download is off",
            ));
        }

        if download.auto_download && download.directory.trim().is_empty() {
            result.add_error(ValidationError::new(
                "download.directory",
                "Download directory cannot be empty",
            ));
        }

        if download.subfolder.contains("..") {
            result.add_error(ValidationError::new(
                "download.subfolder",
                "subfolder cannot escape the download directory",
            ));
        }
    }

    fn validate_browser(config: &Config, result: &mut ValidationResult) {
        let browser = &config.browser;

        if !browser.endpoint.starts_with("http://") && !browser.endpoint.starts_with("https://") {
            result.add_error(ValidationError::new(
                "browser.endpoint",
                "endpoint must start with http:// or https://",
            ));
        }

        if browser.attach_attempts == 0 {
            result.add_error(ValidationError::new(
                "browser.attach_attempts",
                "attach_attempts must be greater than 0",
            ));
        }

        if browser.target_url_contains.is_empty() {
            result.add_warning(ValidationWarning::new(
                "browser.target_url_contains",
                "Empty target filter, the first open tab will be driven",
            ));
        }
    }

    fn validate_selectors(config: &Config, result: &mut ValidationResult) {
        let selectors = &config.selectors;
        let fields = [
            ("selectors.prompt_input", &selectors.prompt_input),
            ("selectors.submit_button", &selectors.submit_button),
            ("selectors.button", &selectors.button),
            ("selectors.ratio_menu_marker", &selectors.ratio_menu_marker),
            ("selectors.ratio_menu_ready", &selectors.ratio_menu_ready),
        ];

        for (path, value) in fields {
            if value.trim().is_empty() {
                result.add_error(ValidationError::new(path, "Selector cannot be empty"));
            }
        }
    }

    fn validate_timing(config: &Config, result: &mut ValidationResult) {
        let timing = &config.timing;

        if timing.locate_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "timing.locate_timeout_ms",
                "locate_timeout_ms must be greater than 0",
            ));
        }

        if timing.staleness_seconds == 0 {
            result.add_error(ValidationError::new(
                "timing.staleness_seconds",
                "staleness_seconds must be greater than 0",
            ));
        }

        if timing.staleness_seconds > config.automation.delay_seconds.max(1) * 10 {
            result.add_warning(ValidationWarning::new(
                "timing.staleness_seconds",
                "staleness window is much longer than the submission delay",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
