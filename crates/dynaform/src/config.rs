#![forbid(unsafe_code)]

use crate::navigation::NavigationOptions;

/// Form-wide behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FormConfig {
    /// How [`Form::navigate`](crate::Form::navigate) moves between rows.
    pub navigation: NavigationOptions,
    /// Re-evaluate observers of a tag when a row with that tag joins or
    /// leaves the form.
    pub refresh_dependents_on_attach: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            navigation: NavigationOptions::default(),
            refresh_dependents_on_attach: true,
        }
    }
}

impl FormConfig {
    #[must_use]
    pub fn with_navigation(mut self, navigation: NavigationOptions) -> Self {
        self.navigation = navigation;
        self
    }

    #[must_use]
    pub fn with_refresh_dependents_on_attach(mut self, refresh: bool) -> Self {
        self.refresh_dependents_on_attach = refresh;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = FormConfig::default();
        assert!(config.refresh_dependents_on_attach);
        assert_eq!(
            config.navigation,
            NavigationOptions::ENABLED | NavigationOptions::SKIP_UNFOCUSABLE
        );
    }

    #[test]
    fn builder_setters() {
        let config = FormConfig::default()
            .with_navigation(NavigationOptions::empty())
            .with_refresh_dependents_on_attach(false);
        assert!(config.navigation.is_empty());
        assert!(!config.refresh_dependents_on_attach);
    }
}
