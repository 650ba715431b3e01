use crate::timers::PollIntervals;
use ratatui::style::{Color, Style};
use std::fmt::{Display, Formatter};
use tokio::time::Duration;

pub type Record = Vec<String>;

pub type RowStyler = fn(&[String]) -> Style;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Containers,
    Images,
    Volumes,
}

impl ResourceKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Containers => "Containers",
            Self::Images => "Images",
            Self::Volumes => "Volumes",
        }
    }

    pub fn command(self) -> &'static str {
        match self {
            Self::Containers => "containers",
            Self::Images => "images",
            Self::Volumes => "volumes",
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            Self::Containers => "container",
            Self::Images => "image",
            Self::Volumes => "volume",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InspectView {
    Details,
    History,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResourceContext {
    Browse(ResourceKind),
    Logs {
        container: String,
    },
    Inspect {
        kind: ResourceKind,
        id: String,
        view: InspectView,
    },
}

impl ResourceContext {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Browse(kind) => *kind,
            Self::Logs { .. } => ResourceKind::Containers,
            Self::Inspect { kind, .. } => *kind,
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Browse(_))
    }

    pub fn title(&self) -> String {
        match self {
            Self::Browse(kind) => kind.title().to_string(),
            Self::Logs { container } => format!("Logs {container}"),
            Self::Inspect {
                kind,
                id,
                view: InspectView::Details,
            } => format!("Inspect {} {id}", kind.noun()),
            Self::Inspect {
                id,
                view: InspectView::History,
                ..
            } => format!("History {id}"),
        }
    }

    pub fn poll_delay(&self, intervals: &PollIntervals) -> Option<Duration> {
        match self {
            Self::Browse(_) => Some(intervals.snapshot),
            Self::Logs { .. } => Some(intervals.logs),
            Self::Inspect { .. } => None,
        }
    }

    pub fn row_styler(&self) -> RowStyler {
        match self {
            Self::Browse(ResourceKind::Containers) => container_row_style,
            Self::Browse(ResourceKind::Images) => image_row_style,
            _ => plain_row_style,
        }
    }
}

impl Display for ResourceContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CommandLine {
    Switch(ResourceKind),
    Quit,
}

const COMMANDS: [(&str, CommandLine); 4] = [
    ("containers", CommandLine::Switch(ResourceKind::Containers)),
    ("images", CommandLine::Switch(ResourceKind::Images)),
    ("volumes", CommandLine::Switch(ResourceKind::Volumes)),
    ("quit", CommandLine::Quit),
];

impl CommandLine {
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.trim();
        let token = token.strip_prefix(':').unwrap_or(token).trim();
        if token.is_empty() {
            return None;
        }

        let token = token.to_ascii_lowercase();
        let mut matches = COMMANDS
            .iter()
            .filter(|(name, _)| name.starts_with(token.as_str()));
        match (matches.next(), matches.next()) {
            (Some((_, command)), None) => Some(*command),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnSpec {
    pub title: String,
    pub width: usize,
    pub max_width: Option<usize>,
}

impl ColumnSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            width: 0,
            max_width: None,
        }
    }

    pub fn capped(mut self, max_width: usize) -> Self {
        self.max_width = Some(max_width);
        self
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Listing {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Record>,
}

impl Listing {
    pub fn new(columns: Vec<ColumnSpec>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    pub server_version: String,
    pub client_version: String,
    pub images: i64,
    pub running: i64,
    pub paused: i64,
    pub stopped: i64,
}

const DEFAULT_ROW: Color = Color::Indexed(225);
const MUTED_ROW: Color = Color::Indexed(242);
const ALERT_ROW: Color = Color::Indexed(196);

fn plain_row_style(_row: &[String]) -> Style {
    Style::default()
}

fn container_row_style(row: &[String]) -> Style {
    let Some(state) = row.get(3) else {
        return Style::default();
    };
    let color = match state.as_str() {
        "created" => Color::Indexed(82),
        "paused" => Color::Indexed(64),
        "restarting" => Color::Indexed(202),
        "removing" => Color::Indexed(169),
        "exited" => MUTED_ROW,
        "dead" => ALERT_ROW,
        _ => DEFAULT_ROW,
    };
    Style::default().fg(color)
}

fn image_row_style(row: &[String]) -> Style {
    let color = if row.get(1).is_some_and(|name| name == "<none>") {
        ALERT_ROW
    } else if row.get(2).is_some_and(|containers| containers == "0") {
        MUTED_ROW
    } else {
        DEFAULT_ROW
    };
    Style::default().fg(color)
}

#[cfg(test)]
mod tests {
    use super::{CommandLine, InspectView, ResourceContext, ResourceKind};
    use crate::timers::PollIntervals;
    use ratatui::style::{Color, Style};

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|field| field.to_string()).collect()
    }

    #[test]
    fn command_prefixes_resolve_to_contexts() {
        assert_eq!(
            CommandLine::parse(":images"),
            Some(CommandLine::Switch(ResourceKind::Images))
        );
        assert_eq!(
            CommandLine::parse(":c"),
            Some(CommandLine::Switch(ResourceKind::Containers))
        );
        assert_eq!(
            CommandLine::parse("vol"),
            Some(CommandLine::Switch(ResourceKind::Volumes))
        );
        assert_eq!(CommandLine::parse(":q"), Some(CommandLine::Quit));
        assert_eq!(CommandLine::parse(" :QUIT "), Some(CommandLine::Quit));
    }

    #[test]
    fn unknown_or_ambiguous_commands_are_rejected() {
        assert_eq!(CommandLine::parse(":bogus"), None);
        assert_eq!(CommandLine::parse(":"), None);
        assert_eq!(CommandLine::parse(""), None);
        assert_eq!(CommandLine::parse(":imagesx"), None);
    }

    #[test]
    fn poll_delay_depends_on_context() {
        let intervals = PollIntervals::default();
        assert_eq!(
            ResourceContext::Browse(ResourceKind::Volumes).poll_delay(&intervals),
            Some(intervals.snapshot)
        );
        assert_eq!(
            ResourceContext::Logs {
                container: "abc".to_string()
            }
            .poll_delay(&intervals),
            Some(intervals.logs)
        );
        assert_eq!(
            ResourceContext::Inspect {
                kind: ResourceKind::Images,
                id: "abc".to_string(),
                view: InspectView::History,
            }
            .poll_delay(&intervals),
            None
        );
    }

    #[test]
    fn container_rows_are_coloured_by_state() {
        let styler = ResourceContext::Browse(ResourceKind::Containers).row_styler();
        assert_eq!(
            styler(&row(&["id", "web", "nginx", "dead", ""])),
            Style::default().fg(Color::Indexed(196))
        );
        assert_eq!(
            styler(&row(&["id", "web", "nginx", "running", ""])),
            Style::default().fg(Color::Indexed(225))
        );
        assert_eq!(styler(&row(&["id"])), Style::default());
    }

    #[test]
    fn untagged_images_take_precedence_over_unused() {
        let styler = ResourceContext::Browse(ResourceKind::Images).row_styler();
        assert_eq!(
            styler(&row(&["id", "<none>", "0", "1 MB"])),
            Style::default().fg(Color::Indexed(196))
        );
        assert_eq!(
            styler(&row(&["id", "nginx:latest", "0", "1 MB"])),
            Style::default().fg(Color::Indexed(242))
        );
    }

    #[test]
    fn transient_contexts_report_their_owner_kind() {
        let logs = ResourceContext::Logs {
            container: "abc".to_string(),
        };
        assert!(logs.is_transient());
        assert_eq!(logs.kind(), ResourceKind::Containers);
        assert!(!ResourceContext::Browse(ResourceKind::Images).is_transient());
    }
}
