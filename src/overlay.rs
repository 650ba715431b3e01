use ratatui::buffer::Buffer;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ESC: char = '\x1b';
const BEL: char = '\x07';
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Sgr { raw: &'a str, params: &'a str },
    Control,
    Char(char),
}

fn tokens(line: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        if ch != ESC {
            out.push(Token::Char(ch));
            continue;
        }

        match chars.peek().copied() {
            Some((_, '[')) => {
                chars.next();
                let params_start = start + 2;
                let mut end = None;
                for (index, byte) in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&byte) {
                        end = Some((index, byte));
                        break;
                    }
                }
                match end {
                    Some((index, 'm')) => out.push(Token::Sgr {
                        raw: &line[start..index + 1],
                        params: &line[params_start..index],
                    }),
                    _ => out.push(Token::Control),
                }
            }
            Some((_, ']')) => {
                chars.next();
                while let Some((_, byte)) = chars.next() {
                    if byte == BEL {
                        break;
                    }
                    if byte == ESC && chars.peek().is_some_and(|(_, next)| *next == '\\') {
                        chars.next();
                        break;
                    }
                }
                out.push(Token::Control);
            }
            Some(_) => {
                chars.next();
                out.push(Token::Control);
            }
            None => out.push(Token::Control),
        }
    }

    out
}

fn is_reset(params: &str) -> bool {
    params.is_empty()
        || params
            .split(';')
            .next()
            .is_some_and(|first| first.is_empty() || first == "0")
}

/// One visible glyph and the style sequences in force when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub width: usize,
    pub style: String,
}

impl Cell {
    fn blank() -> Self {
        Self {
            text: " ".to_string(),
            width: 1,
            style: String::new(),
        }
    }

    fn is_transparent(&self) -> bool {
        self.text == " " && self.style.is_empty()
    }
}

pub fn cells(line: &str) -> Vec<Cell> {
    let mut out: Vec<Cell> = Vec::new();
    let mut style = String::new();

    for token in tokens(line) {
        match token {
            Token::Sgr { raw, params } => {
                if is_reset(params) {
                    style.clear();
                    if params.split(';').count() > 1 {
                        style.push_str(raw);
                    }
                } else {
                    style.push_str(raw);
                }
            }
            Token::Control => {}
            Token::Char(ch) if ch.is_control() => {}
            Token::Char(ch) => {
                let width = ch.width().unwrap_or(0);
                if width == 0 {
                    if let Some(previous) = out.last_mut() {
                        previous.text.push(ch);
                    }
                    continue;
                }
                out.push(Cell {
                    text: ch.to_string(),
                    width,
                    style: style.clone(),
                });
            }
        }
    }

    out
}

pub fn visible_width(line: &str) -> usize {
    cells(line).iter().map(|cell| cell.width).sum()
}

pub fn render_cells<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> String {
    let mut out = String::new();
    let mut active = "";

    for cell in cells {
        if cell.style != active {
            if !active.is_empty() {
                out.push_str(RESET);
            }
            out.push_str(&cell.style);
            active = &cell.style;
        }
        out.push_str(&cell.text);
    }

    if !active.is_empty() {
        out.push_str(RESET);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Start(Cell),
    Continuation,
}

fn columns(cells: Vec<Cell>) -> Vec<Column> {
    let mut out = Vec::new();
    for cell in cells {
        let span = cell.width;
        out.push(Column::Start(cell));
        out.extend((1..span).map(|_| Column::Continuation));
    }
    out
}

fn repair(columns: &mut [Column]) {
    let mut index = 0;
    while index < columns.len() {
        let step = match &columns[index] {
            Column::Start(cell) if cell.width > 1 => {
                let span = cell.width;
                let intact = (1..span).all(|offset| {
                    matches!(columns.get(index + offset), Some(Column::Continuation))
                });
                if intact {
                    span
                } else {
                    columns[index] = Column::Start(Cell::blank());
                    1
                }
            }
            Column::Continuation => {
                columns[index] = Column::Start(Cell::blank());
                1
            }
            Column::Start(_) => 1,
        };
        index += step;
    }
}

fn render_columns(columns: &[Column]) -> String {
    render_cells(columns.iter().filter_map(|column| match column {
        Column::Start(cell) => Some(cell),
        Column::Continuation => None,
    }))
}

/// Offsets may be negative. Rows the overlay does not touch are returned
/// unchanged.
pub fn place_overlay(
    x: i32,
    y: i32,
    overlay: &[String],
    background: &[String],
    opaque: bool,
) -> Vec<String> {
    let block_width = background
        .iter()
        .map(|line| visible_width(line))
        .max()
        .unwrap_or(0) as i64;
    let x = i64::from(x);
    let y = i64::from(y);

    background
        .iter()
        .enumerate()
        .map(|(row, line)| {
            let overlay_row = row as i64 - y;
            if overlay_row < 0 || overlay_row >= overlay.len() as i64 {
                return line.clone();
            }

            let front = columns(cells(&overlay[overlay_row as usize]));
            let left = x.max(0);
            let right = (x + front.len() as i64).min(block_width);
            if left >= right {
                return line.clone();
            }

            let mut composed = columns(cells(line));
            if (composed.len() as i64) < right {
                composed.resize(right as usize, Column::Start(Cell::blank()));
            }

            for column in left..right {
                let source = &front[(column - x) as usize];
                let target = column as usize;
                let transparent =
                    matches!(source, Column::Start(cell) if !opaque && cell.is_transparent());
                if !transparent {
                    composed[target] = source.clone();
                }
            }

            repair(&mut composed);
            render_columns(&composed)
        })
        .collect()
}

pub fn centered_origin(overlay: &[String], background: &[String]) -> (i32, i32) {
    let overlay_width = overlay.iter().map(|line| visible_width(line)).max().unwrap_or(0) as i64;
    let background_width = background
        .iter()
        .map(|line| visible_width(line))
        .max()
        .unwrap_or(0) as i64;
    let x = (background_width - overlay_width) / 2;
    let y = (background.len() as i64 - overlay.len() as i64) / 2;
    (
        x.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        y.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
    )
}

fn push_color(codes: &mut Vec<String>, color: Color, background: bool) {
    let base = if background { 10 } else { 0 };
    let extended = if background { 48 } else { 38 };
    let code = match color {
        Color::Reset => return,
        Color::Black => 30,
        Color::Red => 31,
        Color::Green => 32,
        Color::Yellow => 33,
        Color::Blue => 34,
        Color::Magenta => 35,
        Color::Cyan => 36,
        Color::Gray => 37,
        Color::DarkGray => 90,
        Color::LightRed => 91,
        Color::LightGreen => 92,
        Color::LightYellow => 93,
        Color::LightBlue => 94,
        Color::LightMagenta => 95,
        Color::LightCyan => 96,
        Color::White => 97,
        Color::Indexed(index) => {
            codes.push(format!("{extended};5;{index}"));
            return;
        }
        Color::Rgb(r, g, b) => {
            codes.push(format!("{extended};2;{r};{g};{b}"));
            return;
        }
    };
    codes.push((code + base).to_string());
}

const MODIFIER_CODES: [(Modifier, u8); 9] = [
    (Modifier::BOLD, 1),
    (Modifier::DIM, 2),
    (Modifier::ITALIC, 3),
    (Modifier::UNDERLINED, 4),
    (Modifier::SLOW_BLINK, 5),
    (Modifier::RAPID_BLINK, 6),
    (Modifier::REVERSED, 7),
    (Modifier::HIDDEN, 8),
    (Modifier::CROSSED_OUT, 9),
];

fn sgr_sequence(fg: Color, bg: Color, modifier: Modifier) -> String {
    let mut codes = Vec::new();
    for (flag, code) in MODIFIER_CODES {
        if modifier.contains(flag) {
            codes.push(code.to_string());
        }
    }
    push_color(&mut codes, fg, false);
    push_color(&mut codes, bg, true);

    if codes.is_empty() {
        String::new()
    } else {
        format!("\x1b[{}m", codes.join(";"))
    }
}

pub fn buffer_lines(buffer: &Buffer) -> Vec<String> {
    let area = buffer.area;
    (area.top()..area.bottom())
        .map(|y| {
            let mut row = Vec::with_capacity(usize::from(area.width));
            let mut skip = 0usize;
            for x in area.left()..area.right() {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                let cell = &buffer[(x, y)];
                let symbol = cell.symbol();
                let width = symbol.width();
                let (text, width) = if width == 0 {
                    (" ".to_string(), 1)
                } else {
                    (symbol.to_string(), width)
                };
                skip = width - 1;
                row.push(Cell {
                    text,
                    width,
                    style: sgr_sequence(cell.fg, cell.bg, cell.modifier),
                });
            }
            render_cells(&row)
        })
        .collect()
}

fn basic_color(code: u16) -> Color {
    match code {
        0 => Color::Black,
        1 => Color::Red,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Blue,
        5 => Color::Magenta,
        6 => Color::Cyan,
        _ => Color::Gray,
    }
}

fn bright_color(code: u16) -> Color {
    match code {
        0 => Color::DarkGray,
        1 => Color::LightRed,
        2 => Color::LightGreen,
        3 => Color::LightYellow,
        4 => Color::LightBlue,
        5 => Color::LightMagenta,
        6 => Color::LightCyan,
        _ => Color::White,
    }
}

fn extended_color(params: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match params.next()? {
        5 => params.next().map(|index| Color::Indexed(index.min(255) as u8)),
        2 => {
            let r = params.next()?.min(255) as u8;
            let g = params.next()?.min(255) as u8;
            let b = params.next()?.min(255) as u8;
            Some(Color::Rgb(r, g, b))
        }
        _ => None,
    }
}

fn apply_sgr(mut style: Style, params: &str) -> Style {
    let mut codes = params
        .split(';')
        .map(|param| param.parse::<u16>().unwrap_or(0));

    while let Some(code) = codes.next() {
        style = match code {
            0 => Style::default(),
            1 => style.add_modifier(Modifier::BOLD),
            2 => style.add_modifier(Modifier::DIM),
            3 => style.add_modifier(Modifier::ITALIC),
            4 => style.add_modifier(Modifier::UNDERLINED),
            5 => style.add_modifier(Modifier::SLOW_BLINK),
            6 => style.add_modifier(Modifier::RAPID_BLINK),
            7 => style.add_modifier(Modifier::REVERSED),
            8 => style.add_modifier(Modifier::HIDDEN),
            9 => style.add_modifier(Modifier::CROSSED_OUT),
            21 | 22 => style.remove_modifier(Modifier::BOLD | Modifier::DIM),
            23 => style.remove_modifier(Modifier::ITALIC),
            24 => style.remove_modifier(Modifier::UNDERLINED),
            25 => style.remove_modifier(Modifier::SLOW_BLINK | Modifier::RAPID_BLINK),
            27 => style.remove_modifier(Modifier::REVERSED),
            28 => style.remove_modifier(Modifier::HIDDEN),
            29 => style.remove_modifier(Modifier::CROSSED_OUT),
            30..=37 => style.fg(basic_color(code - 30)),
            38 => match extended_color(&mut codes) {
                Some(color) => style.fg(color),
                None => style,
            },
            39 => style.fg(Color::Reset),
            40..=47 => style.bg(basic_color(code - 40)),
            48 => match extended_color(&mut codes) {
                Some(color) => style.bg(color),
                None => style,
            },
            49 => style.bg(Color::Reset),
            90..=97 => style.fg(bright_color(code - 90)),
            100..=107 => style.bg(bright_color(code - 100)),
            _ => style,
        };
    }

    style
}

pub fn parse_line(line: &str) -> Line<'static> {
    let mut spans = Vec::new();
    let mut style = Style::default();
    let mut text = String::new();

    for token in tokens(line) {
        match token {
            Token::Sgr { params, .. } => {
                let next = apply_sgr(style, params);
                if next != style && !text.is_empty() {
                    spans.push(Span::styled(std::mem::take(&mut text), style));
                }
                style = next;
            }
            Token::Control => {}
            Token::Char(ch) if ch.is_control() => {}
            Token::Char(ch) => text.push(ch),
        }
    }

    if !text.is_empty() {
        spans.push(Span::styled(text, style));
    }
    Line::from(spans)
}
