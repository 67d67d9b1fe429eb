//! crates/dermassist_core/src/presentation.rs
//!
//! Small view helpers shared by the terminal front end and any other renderer:
//! responsive breakpoints and quick-action wording.

/// Width below which the intake form and chat stack vertically.
pub const STACKED_MAX_WIDTH: u32 = 815;
/// Width from which the side panel is shown next to the form.
pub const SIDE_PANEL_MIN_WIDTH: u32 = 1164;
/// Width above which the content column narrows to 80%.
pub const NARROW_MAX_WIDTH: u32 = 1405;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Stacked,
    Compact,
    Wide,
}

impl Layout {
    pub fn for_width(width: u32) -> Self {
        if width <= STACKED_MAX_WIDTH {
            Layout::Stacked
        } else if width < SIDE_PANEL_MIN_WIDTH {
            Layout::Compact
        } else {
            Layout::Wide
        }
    }

    pub fn shows_side_panel(&self) -> bool {
        matches!(self, Layout::Wide)
    }

    /// Share of the screen, in percent, the content column spans at `width`.
    pub fn content_width_percent(width: u32) -> u32 {
        if width <= NARROW_MAX_WIDTH {
            95
        } else {
            80
        }
    }

    /// Columns the content spans at `width`.
    pub fn content_width(width: u32) -> u32 {
        width * Self::content_width_percent(width) / 100
    }
}

/// The question a quick-action button pre-fills into the chat input.
pub fn quick_action_prompt(action: &str) -> String {
    match action {
        "alternative_treatments" => "What are some alternative treatments for my condition?".into(),
        "learn_more" => "Can you tell me more about this condition?".into(),
        "ask_specialist" => "When should I consult a specialist about this?".into(),
        other => other.to_string(),
    }
}

/// Button label of a suggested action.
pub fn action_label(action: &str) -> String {
    action.replace('_', " ")
}
