use crate::dialog::Dialog;
use crate::input::{self, Action, LineInput};
use crate::keymap::{self, ActionRequest, KeyBinding, Outcome};
use crate::model::{CommandLine, Listing, ResourceContext, ResourceKind, ServerInfo};
use crate::table::TableModel;
use crate::timers::{IdGenerator, PollIntervals, TimerTick};
use chrono::Local;
use crossterm::event::KeyEvent;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const BANNER_HEIGHT: u16 = 5;
pub const INPUT_HEIGHT: u16 = 3;
pub const STATUS_HEIGHT: u16 = 1;
pub const TABLE_CHROME: u16 = 3;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Focus {
    Table,
    Input,
    Dialog,
}

/// The dialog lives inside the focus so one cannot exist without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FocusState {
    Table,
    Input,
    Dialog(Dialog),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    None,
    Refresh { view: u64 },
    RefreshBanner { banner: u64 },
    Dispatch(ActionRequest),
}

#[derive(Debug, Clone)]
struct LiveView {
    id: u64,
    table: TableModel,
}

#[derive(Debug, Clone)]
struct Banner {
    id: u64,
    info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

pub struct App {
    running: bool,
    focus: FocusState,
    context: ResourceContext,
    base: ResourceKind,
    view: LiveView,
    banner: Banner,
    bindings: &'static [KeyBinding],
    input: LineInput,
    viewport: Viewport,
    ids: Arc<dyn IdGenerator>,
    intervals: PollIntervals,
    status: String,
}

impl App {
    pub fn new(initial: ResourceKind, ids: Arc<dyn IdGenerator>, intervals: PollIntervals) -> Self {
        let context = ResourceContext::Browse(initial);
        let view = LiveView {
            id: ids.next_id(),
            table: TableModel::new(context.row_styler()),
        };
        let banner = Banner {
            id: ids.next_id(),
            info: None,
        };

        Self {
            running: true,
            focus: FocusState::Table,
            bindings: keymap::bindings(&context),
            context,
            base: initial,
            view,
            banner,
            input: LineInput::default(),
            viewport: Viewport::default(),
            ids,
            intervals,
            status: "Press : for commands, q to quit".to_string(),
        }
    }

    pub fn start(&self) -> [AppCommand; 2] {
        [
            AppCommand::Refresh { view: self.view.id },
            AppCommand::RefreshBanner {
                banner: self.banner.id,
            },
        ]
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn focus(&self) -> Focus {
        match self.focus {
            FocusState::Table => Focus::Table,
            FocusState::Input => Focus::Input,
            FocusState::Dialog(_) => Focus::Dialog,
        }
    }

    pub fn dialog(&self) -> Option<&Dialog> {
        match &self.focus {
            FocusState::Dialog(dialog) => Some(dialog),
            _ => None,
        }
    }

    pub fn context(&self) -> &ResourceContext {
        &self.context
    }

    #[cfg(test)]
    pub fn base(&self) -> ResourceKind {
        self.base
    }

    pub fn table(&self) -> &TableModel {
        &self.view.table
    }

    pub fn view_id(&self) -> u64 {
        self.view.id
    }

    pub fn banner_id(&self) -> u64 {
        self.banner.id
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.banner.info.as_ref()
    }

    pub fn input(&self) -> &LineInput {
        &self.input
    }

    pub fn bindings(&self) -> &'static [KeyBinding] {
        self.bindings
    }

    pub fn intervals(&self) -> &PollIntervals {
        &self.intervals
    }

    #[cfg(test)]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppCommand {
        match input::map_key(self.focus(), key, self.bindings) {
            Some(action) => {
                debug!("key {key:?} -> {action:?}");
                self.apply_action(action)
            }
            None => AppCommand::None,
        }
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if action == Action::Quit {
            self.running = false;
            self.status = "Exit requested".to_string();
            return AppCommand::None;
        }

        match self.focus() {
            Focus::Table => self.apply_table_action(action),
            Focus::Input => self.apply_input_action(action),
            Focus::Dialog => self.apply_dialog_action(action),
        }
    }

    fn apply_table_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::StartCommand => {
                self.input.clear();
                self.input.insert(':');
                self.focus = FocusState::Input;
            }
            Action::Escape => return self.escape(),
            Action::Sort(key) => self.view.table.sort(key),
            Action::Resource(action) => return self.run_resource_action(action),
            Action::Up => self.view.table.up(),
            Action::Down => self.view.table.down(),
            Action::PageUp => self.view.table.page_up(),
            Action::PageDown => self.view.table.page_down(),
            Action::Top => self.view.table.home(),
            Action::Bottom => self.view.table.end(),
            _ => {}
        }
        AppCommand::None
    }

    fn apply_input_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::Submit => return self.submit(),
            Action::Escape => return self.escape(),
            Action::InputChar(ch) => self.input.insert(ch),
            Action::Backspace => self.input.backspace(),
            Action::Delete => self.input.delete(),
            Action::CursorLeft => self.input.left(),
            Action::CursorRight => self.input.right(),
            Action::CursorHome => self.input.home(),
            Action::CursorEnd => self.input.end(),
            Action::ClearLine => self.input.clear(),
            Action::DeleteWord => self.input.delete_word(),
            _ => {}
        }
        AppCommand::None
    }

    fn apply_dialog_action(&mut self, action: Action) -> AppCommand {
        match action {
            Action::DialogNext | Action::DialogPrevious => {
                if let FocusState::Dialog(dialog) = &mut self.focus {
                    if action == Action::DialogNext {
                        dialog.next();
                    } else {
                        dialog.previous();
                    }
                }
                AppCommand::None
            }
            Action::DialogConfirm => {
                let FocusState::Dialog(dialog) =
                    std::mem::replace(&mut self.focus, FocusState::Table)
                else {
                    return AppCommand::None;
                };
                match dialog.choose() {
                    Some(request) => {
                        info!(
                            "confirmed {} on {}",
                            request.action,
                            request.kind.title()
                        );
                        self.status = format!("Dispatched {}", request.action);
                        AppCommand::Dispatch(request)
                    }
                    None => AppCommand::None,
                }
            }
            Action::DialogDismiss => {
                self.focus = FocusState::Table;
                AppCommand::None
            }
            _ => AppCommand::None,
        }
    }

    fn run_resource_action(&mut self, action: keymap::ResourceAction) -> AppCommand {
        let kind = self.context.kind();
        match keymap::resolve(kind, action, self.view.table.selected_key()) {
            Some(Outcome::Open(context)) => self.switch_context(context),
            Some(Outcome::Run(request)) => {
                info!(
                    "{} {} {}",
                    request.action,
                    kind.noun(),
                    request.target.as_deref().unwrap_or_default()
                );
                self.status = format!("Dispatched {}", request.action);
                AppCommand::Dispatch(request)
            }
            Some(Outcome::Confirm {
                title,
                message,
                request,
            }) => {
                self.focus = FocusState::Dialog(Dialog::confirm(title, message, request));
                AppCommand::None
            }
            None => {
                self.status = format!("Nothing selected to {action}");
                AppCommand::None
            }
        }
    }

    fn submit(&mut self) -> AppCommand {
        let text = self.input.take();
        self.focus = FocusState::Table;

        match CommandLine::parse(&text) {
            Some(CommandLine::Switch(kind)) => self.switch_context(ResourceContext::Browse(kind)),
            Some(CommandLine::Quit) => {
                self.running = false;
                self.status = "Exit requested".to_string();
                AppCommand::None
            }
            None => {
                debug!("unsupported command {text:?}");
                self.focus =
                    FocusState::Dialog(Dialog::error(format!("Unsupported Command: [{text}]")));
                AppCommand::None
            }
        }
    }

    fn escape(&mut self) -> AppCommand {
        if self.focus() == Focus::Input {
            self.input.clear();
            self.focus = FocusState::Table;
        }

        if self.context.is_transient() {
            self.switch_context(ResourceContext::Browse(self.base))
        } else {
            AppCommand::None
        }
    }

    pub fn switch_context(&mut self, context: ResourceContext) -> AppCommand {
        info!("switching to {context}");
        if let ResourceContext::Browse(kind) = context {
            self.base = kind;
        }

        let mut table = TableModel::new(context.row_styler());
        let (width, height) = self.table_viewport();
        table.set_viewport(width, height);

        self.view = LiveView {
            id: self.ids.next_id(),
            table,
        };
        self.bindings = keymap::bindings(&context);
        self.status = format!("Loading {context}");
        self.context = context;

        AppCommand::Refresh { view: self.view.id }
    }

    pub fn on_tick(&self, tick: &TimerTick) -> AppCommand {
        if tick.id == self.view.id {
            AppCommand::Refresh { view: tick.id }
        } else if tick.id == self.banner.id {
            AppCommand::RefreshBanner { banner: tick.id }
        } else {
            debug!("ignoring stale tick id={}", tick.id);
            AppCommand::None
        }
    }

    pub fn apply_listing(&mut self, view: u64, result: anyhow::Result<Listing>) {
        if view != self.view.id {
            debug!("dropping rows for replaced view id={view}");
            return;
        }

        match result {
            Ok(listing) => {
                let count = listing.rows.len();
                let table = &mut self.view.table;
                table.set_data(listing.columns, listing.rows);
                match self.context {
                    ResourceContext::Browse(_) => table.resort(),
                    ResourceContext::Logs { .. } => table.select_last(),
                    ResourceContext::Inspect { .. } => {}
                }
                self.status = format!(
                    "{}: {count} rows at {}",
                    self.context,
                    Local::now().format("%H:%M:%S")
                );
            }
            Err(err) => {
                warn!("refresh of {} failed: {err:#}", self.context);
                self.status = format!("Refresh failed: {err:#}");
            }
        }
    }

    pub fn apply_server_info(&mut self, banner: u64, result: anyhow::Result<ServerInfo>) {
        if banner != self.banner.id {
            return;
        }
        match result {
            Ok(info) => self.banner.info = Some(info),
            Err(err) => warn!("server info refresh failed: {err:#}"),
        }
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.viewport = Viewport { width, height };
        let (width, height) = self.table_viewport();
        self.view.table.set_viewport(width, height);
    }

    fn table_viewport(&self) -> (u16, u16) {
        let reserved = BANNER_HEIGHT + INPUT_HEIGHT + STATUS_HEIGHT + TABLE_CHROME;
        (
            self.viewport.width.saturating_sub(2),
            self.viewport.height.saturating_sub(reserved),
        )
    }
}
