use crate::model::{ControlId, Mode};

/// Active analysis mode. Changes only on explicit user selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSelector {
    active: Mode,
}

impl Default for ModeSelector {
    fn default() -> Self {
        Self {
            active: Mode::ALL[0],
        }
    }
}

impl ModeSelector {
    pub fn active(&self) -> Mode {
        self.active
    }

    pub fn select(&mut self, mode: Mode) {
        self.active = mode;
    }

    pub fn next(&mut self) {
        let i = Mode::ALL.iter().position(|m| *m == self.active).unwrap_or(0);
        self.active = Mode::ALL[(i + 1) % Mode::ALL.len()];
    }

    pub fn previous(&mut self) {
        let i = Mode::ALL.iter().position(|m| *m == self.active).unwrap_or(0);
        self.active = Mode::ALL[(i + Mode::ALL.len() - 1) % Mode::ALL.len()];
    }

    /// Extraction controls shown for the active mode.
    pub fn visible_controls(&self) -> &'static [ControlId] {
        match self.active {
            Mode::Multilingual => &[ControlId::Extract, ControlId::Entities],
            Mode::Outline | Mode::Persona | Mode::Semantic => &[ControlId::Extract],
        }
    }

    pub fn is_visible(&self, control: ControlId) -> bool {
        control == ControlId::LocalOutline || self.visible_controls().contains(&control)
    }

    /// Idle label of a control under the active mode.
    pub fn label(&self, control: ControlId) -> &'static str {
        match (control, self.active) {
            (ControlId::Extract, Mode::Outline) => "Extract Outline",
            (ControlId::Extract, Mode::Persona) => "Extract Persona Insights",
            (ControlId::Extract, Mode::Semantic) => "Extract Semantic Outline",
            (ControlId::Extract, Mode::Multilingual) => "Analyze Text",
            (ControlId::Entities, _) => "Extract Entities",
            (ControlId::LocalOutline, _) => "Local Outline",
        }
    }
}
