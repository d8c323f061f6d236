use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Type(char),
    Backspace,
    Submit,
    Cancel,
    NextMode,
    PreviousMode,
    Primary,
    Secondary,
    LocalOutline,
    Health,
    OpenPrompt,
    CloseDocument,
    Save,
    Copy,
    ToggleHelp,
    ScrollUp,
    ScrollDown,
    None,
}

/// Map a crossterm terminal event to a TUI action.
pub fn map_event(event: &Event) -> Action {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => map_key(key),
        _ => Action::None,
    }
}

fn map_key(key: &KeyEvent) -> Action {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Action::Quit,
            KeyCode::Char('o') => Action::OpenPrompt,
            KeyCode::Char('w') => Action::CloseDocument,
            KeyCode::Char('s') => Action::Save,
            KeyCode::Char('y') => Action::Copy,
            _ => Action::None,
        };
    }

    match key.code {
        KeyCode::Enter => Action::Submit,
        KeyCode::Esc => Action::Cancel,
        KeyCode::Backspace => Action::Backspace,
        KeyCode::Tab => Action::NextMode,
        KeyCode::BackTab => Action::PreviousMode,
        KeyCode::F(1) => Action::ToggleHelp,
        KeyCode::F(2) => Action::Health,
        KeyCode::F(5) => Action::Primary,
        KeyCode::F(6) => Action::Secondary,
        KeyCode::F(7) => Action::LocalOutline,
        KeyCode::PageUp => Action::ScrollUp,
        KeyCode::PageDown => Action::ScrollDown,
        KeyCode::Char(c) => Action::Type(c),
        _ => Action::None,
    }
}
