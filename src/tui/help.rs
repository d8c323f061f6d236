use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const KEYBINDS: &[(&str, &str)] = &[
    ("Enter", "Run console command / confirm path"),
    ("Tab", "Next mode"),
    ("Shift-Tab", "Previous mode"),
    ("F5", "Primary extraction for the mode"),
    ("F6", "Extract entities (multilingual)"),
    ("F7", "Local outline extraction"),
    ("F2", "Backend health check"),
    ("Ctrl-O", "Open PDF"),
    ("Ctrl-W", "Close PDF"),
    ("Ctrl-S", "Save result JSON"),
    ("Ctrl-Y", "Copy result to clipboard"),
    ("PgUp/PgDn", "Scroll console"),
    ("F1", "Toggle this help"),
    ("Esc", "Cancel prompt / close help"),
    ("Ctrl-C", "Quit"),
];

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![Line::from("Keybinds:")];
    for (key, what) in KEYBINDS {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{key:<11}"), Style::default().fg(Color::Magenta)),
            Span::raw(*what),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from("Console commands go to the backend command handler,"));
    lines.push(Line::from("e.g. help, status, list-pdfs, clear, install-spacy."));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
