use crate::keymap::ActionRequest;
use crate::overlay;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Padding, Paragraph, Widget};
use unicode_width::UnicodeWidthStr;

const CONTENT_WIDTH: u16 = 50;
const BORDER: Color = Color::Rgb(0x87, 0x4b, 0xfd);
const BUTTON_FG: Color = Color::Rgb(0xff, 0xf7, 0xdb);
const BUTTON_BG: Color = Color::Rgb(0x88, 0x8b, 0x7e);
const ACTIVE_BG: Color = Color::Rgb(0xf2, 0x5d, 0x94);

pub const CONFIRM: &str = "Confirm";
pub const DISMISS: &str = "Dismiss";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    title: String,
    message: String,
    buttons: Vec<String>,
    selected: usize,
    on_confirm: Option<ActionRequest>,
}

impl Dialog {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            message: message.into(),
            buttons: vec![DISMISS.to_string()],
            selected: 0,
            on_confirm: None,
        }
    }

    pub fn confirm(
        title: impl Into<String>,
        message: impl Into<String>,
        request: ActionRequest,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            buttons: vec![CONFIRM.to_string(), DISMISS.to_string()],
            selected: 0,
            on_confirm: Some(request),
        }
    }

    #[cfg(test)]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[cfg(test)]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[cfg(test)]
    pub fn buttons(&self) -> &[String] {
        &self.buttons
    }

    #[cfg(test)]
    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn next(&mut self) {
        self.selected = (self.selected + 1) % self.buttons.len();
    }

    pub fn previous(&mut self) {
        self.selected = (self.selected + self.buttons.len() - 1) % self.buttons.len();
    }

    pub fn choose(self) -> Option<ActionRequest> {
        if self.buttons.get(self.selected).map(String::as_str) == Some(CONFIRM) {
            self.on_confirm
        } else {
            None
        }
    }

    pub fn render_lines(&self) -> Vec<String> {
        let message = wrap(&self.message, usize::from(CONTENT_WIDTH));

        let mut lines = Vec::with_capacity(message.len() + 3);
        lines.push(
            Line::from(Span::styled(
                self.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ))
            .alignment(Alignment::Center),
        );
        lines.extend(
            message
                .into_iter()
                .map(|line| Line::from(line).alignment(Alignment::Center)),
        );
        lines.push(Line::default());
        lines.push(self.button_bar().alignment(Alignment::Center));

        // border + vertical padding on both sides
        let height = lines.len() as u16 + 4;
        let area = Rect::new(0, 0, CONTENT_WIDTH + 2, height);
        let mut buffer = Buffer::empty(area);

        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(BORDER))
            .padding(Padding::vertical(1));
        Paragraph::new(lines).block(block).render(area, &mut buffer);

        overlay::buffer_lines(&buffer)
    }

    fn button_bar(&self) -> Line<'static> {
        let mut spans = Vec::new();
        for (index, label) in self.buttons.iter().enumerate() {
            if index > 0 {
                spans.push(Span::raw("  "));
            }
            let style = if index == self.selected {
                Style::default()
                    .fg(BUTTON_FG)
                    .bg(ACTIVE_BG)
                    .add_modifier(Modifier::UNDERLINED)
            } else {
                Style::default().fg(BUTTON_FG).bg(BUTTON_BG)
            };
            spans.push(Span::styled(format!("   {label}   "), style));
        }
        Line::from(spans)
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.width()
        } else {
            current.width() + 1 + word.width()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
