use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Whether the environment allows color at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Color when stdout is a terminal
    Auto,
    /// `NO_COLOR` or `EHR_NO_COLOR` is set
    Never,
}

impl ColorMode {
    pub fn from_env() -> Self {
        let disabled = ["NO_COLOR", "EHR_NO_COLOR"]
            .iter()
            .any(|name| std::env::var_os(name).is_some_and(|value| !value.is_empty()));
        if disabled { Self::Never } else { Self::Auto }
    }

    pub fn enabled(self, is_term: bool) -> bool {
        self == Self::Auto && is_term
    }
}

/// Styles for report headers, match/no-match verdicts and field labels
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    pub dim: Style,
}

impl Theme {
    pub fn new(colored: bool) -> Self {
        let pick = |style: Style| if colored { style } else { Style::new() };
        Self {
            header: pick(Style::new().cyan().bold()),
            success: pick(Style::new().green().bold()),
            error: pick(Style::new().red().bold()),
            warn: pick(Style::new().yellow().bold()),
            info: pick(Style::new().blue()),
            dim: pick(Style::new().dimmed()),
        }
    }

    pub fn detect() -> Self {
        Self::new(ColorMode::from_env().enabled(console::Term::stdout().is_term()))
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use owo_colors::OwoColorize;

    #[test]
    fn test_color_needs_terminal_and_permission() {
        assert!(ColorMode::Auto.enabled(true));
        assert!(!ColorMode::Auto.enabled(false));
        assert!(!ColorMode::Never.enabled(true));
    }

    #[test]
    fn test_plain_theme_emits_no_escapes() {
        let colored = format!("{}", "HDL".style(Theme::new(true).warn));
        assert!(colored.contains("\x1b["));
        assert!(colored.contains("HDL"));

        let plain = Theme::new(false);
        for style in [plain.header, plain.success, plain.error, plain.warn, plain.info, plain.dim] {
            assert_eq!(format!("{}", "HDL".style(style)), "HDL");
        }
    }
}
