//! Command definitions organized by domain.
//!
//! Commands follow the `Domain.methodName` format of the DevTools protocol.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Page` | Navigation, lifecycle events, rendering, close |
//! | `Runtime` | Script evaluation |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Page domain commands.
    Page(PageCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands for navigation, lifecycle and rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable page domain notifications.
    #[serde(rename = "Page.enable")]
    Enable,

    /// Toggle lifecycle event reporting (load, networkIdle, ...).
    #[serde(rename = "Page.setLifecycleEventsEnabled")]
    SetLifecycleEventsEnabled {
        /// Whether lifecycle events should be emitted.
        enabled: bool,
    },

    /// Navigate to URL.
    #[serde(rename = "Page.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },

    /// Capture a screenshot of the visible viewport.
    #[serde(rename = "Page.captureScreenshot")]
    CaptureScreenshot,

    /// Render the page to a PDF document.
    #[serde(rename = "Page.printToPDF")]
    PrintToPdf {
        /// Show the header/footer templates.
        #[serde(rename = "displayHeaderFooter")]
        display_header_footer: bool,
        /// Header HTML template.
        #[serde(rename = "headerTemplate")]
        header_template: String,
        /// Print background graphics.
        #[serde(rename = "printBackground")]
        print_background: bool,
        /// Top margin in inches.
        #[serde(rename = "marginTop")]
        margin_top: f64,
        /// Bottom margin in inches.
        #[serde(rename = "marginBottom")]
        margin_bottom: f64,
        /// Left margin in inches.
        #[serde(rename = "marginLeft")]
        margin_left: f64,
        /// Right margin in inches.
        #[serde(rename = "marginRight")]
        margin_right: f64,
    },

    /// Close the page target.
    #[serde(rename = "Page.close")]
    Close,
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands for script execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Evaluate a script expression in the page context.
    #[serde(rename = "Runtime.evaluate")]
    Evaluate {
        /// Expression to evaluate.
        expression: String,
    },
}

// ============================================================================
// Constructors
// ============================================================================

impl Command {
    /// Creates a `Page.enable` command.
    #[inline]
    #[must_use]
    pub fn page_enable() -> Self {
        Self::Page(PageCommand::Enable)
    }

    /// Creates a `Page.setLifecycleEventsEnabled` command.
    #[inline]
    #[must_use]
    pub fn set_lifecycle_events(enabled: bool) -> Self {
        Self::Page(PageCommand::SetLifecycleEventsEnabled { enabled })
    }

    /// Creates a `Page.navigate` command.
    #[inline]
    #[must_use]
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::Page(PageCommand::Navigate { url: url.into() })
    }

    /// Creates a `Page.captureScreenshot` command with default format.
    #[inline]
    #[must_use]
    pub fn capture_screenshot() -> Self {
        Self::Page(PageCommand::CaptureScreenshot)
    }

    /// Creates a `Page.printToPDF` command.
    ///
    /// Margins are zeroed and backgrounds printed; the header template shows
    /// only the page URL so the archived document records where it came from.
    #[must_use]
    pub fn print_to_pdf() -> Self {
        Self::Page(PageCommand::PrintToPdf {
            display_header_footer: true,
            header_template: r#"<span class=url></span>"#.to_string(),
            print_background: true,
            margin_top: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            margin_right: 0.0,
        })
    }

    /// Creates a `Page.close` command.
    #[inline]
    #[must_use]
    pub fn close_page() -> Self {
        Self::Page(PageCommand::Close)
    }

    /// Creates a `Runtime.evaluate` command.
    #[inline]
    #[must_use]
    pub fn evaluate(expression: impl Into<String>) -> Self {
        Self::Runtime(RuntimeCommand::Evaluate {
            expression: expression.into(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_serialization() {
        let command = Command::navigate("https://example.com");
        let json = serde_json::to_string(&command).expect("serialize");

        assert!(json.contains(r#""method":"Page.navigate""#));
        assert!(json.contains(r#""url":"https://example.com""#));
    }

    #[test]
    fn test_unit_command_omits_params() {
        let command = Command::close_page();
        let json = serde_json::to_string(&command).expect("serialize");

        assert_eq!(json, r#"{"method":"Page.close"}"#);
    }

    #[test]
    fn test_evaluate_serialization() {
        let command = Command::evaluate("document.title");
        let json = serde_json::to_string(&command).expect("serialize");

        assert!(json.contains(r#""method":"Runtime.evaluate""#));
        assert!(json.contains(r#""expression":"document.title""#));
    }

    #[test]
    fn test_print_to_pdf_params() {
        let command = Command::print_to_pdf();
        let value = serde_json::to_value(&command).expect("serialize");

        assert_eq!(value["method"], "Page.printToPDF");
        assert_eq!(value["params"]["printBackground"], true);
        assert_eq!(value["params"]["marginTop"], 0.0);
        assert_eq!(value["params"]["headerTemplate"], "<span class=url></span>");
    }

    #[test]
    fn test_lifecycle_toggle_serialization() {
        let command = Command::set_lifecycle_events(true);
        let value = serde_json::to_value(&command).expect("serialize");

        assert_eq!(value["method"], "Page.setLifecycleEventsEnabled");
        assert_eq!(value["params"]["enabled"], true);
    }
}
