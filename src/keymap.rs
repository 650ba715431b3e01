use crate::model::{InspectView, ResourceContext, ResourceKind};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceAction {
    Inspect,
    Logs,
    History,
    Restart,
    Stop,
    Remove,
    Prune,
    Save,
}

impl ResourceAction {
    pub fn needs_confirmation(self) -> bool {
        matches!(self, Self::Remove | Self::Prune | Self::Save)
    }

    /// Prune works on the whole kind and ignores the selected row.
    pub fn needs_target(self) -> bool {
        !matches!(self, Self::Prune)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::Logs => "logs",
            Self::History => "history",
            Self::Restart => "restart",
            Self::Stop => "stop",
            Self::Remove => "remove",
            Self::Prune => "prune",
            Self::Save => "save",
        }
    }
}

impl Display for ResourceAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct KeyBinding {
    pub key: &'static str,
    pub action: ResourceAction,
    pub help: &'static str,
}

const fn bind(key: &'static str, action: ResourceAction, help: &'static str) -> KeyBinding {
    KeyBinding { key, action, help }
}

const CONTAINER_BINDINGS: &[KeyBinding] = &[
    bind("i", ResourceAction::Inspect, "inspect"),
    bind("l", ResourceAction::Logs, "logs"),
    bind("ctrl+r", ResourceAction::Restart, "restart"),
    bind("ctrl+k", ResourceAction::Stop, "stop"),
    bind("ctrl+p", ResourceAction::Prune, "prune"),
];

const IMAGE_BINDINGS: &[KeyBinding] = &[
    bind("i", ResourceAction::Inspect, "inspect"),
    bind("h", ResourceAction::History, "history"),
    bind("ctrl+d", ResourceAction::Remove, "remove"),
    bind("ctrl+p", ResourceAction::Prune, "prune"),
    bind("ctrl+s", ResourceAction::Save, "save"),
];

const VOLUME_BINDINGS: &[KeyBinding] = &[
    bind("i", ResourceAction::Inspect, "inspect"),
    bind("ctrl+d", ResourceAction::Remove, "remove"),
    bind("ctrl+p", ResourceAction::Prune, "prune"),
];

pub fn bindings(context: &ResourceContext) -> &'static [KeyBinding] {
    match context {
        ResourceContext::Browse(ResourceKind::Containers) => CONTAINER_BINDINGS,
        ResourceContext::Browse(ResourceKind::Images) => IMAGE_BINDINGS,
        ResourceContext::Browse(ResourceKind::Volumes) => VOLUME_BINDINGS,
        ResourceContext::Logs { .. } | ResourceContext::Inspect { .. } => &[],
    }
}

pub fn lookup(bindings: &[KeyBinding], signature: &str) -> Option<ResourceAction> {
    bindings
        .iter()
        .find(|binding| binding.key == signature)
        .map(|binding| binding.action)
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ActionRequest {
    pub kind: ResourceKind,
    pub action: ResourceAction,
    pub target: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outcome {
    Open(ResourceContext),
    Run(ActionRequest),
    Confirm {
        title: String,
        message: String,
        request: ActionRequest,
    },
}

pub fn resolve(
    kind: ResourceKind,
    action: ResourceAction,
    selected: Option<&str>,
) -> Option<Outcome> {
    let target = selected.map(str::to_string);
    if action.needs_target() && target.is_none() {
        return None;
    }

    let outcome = match action {
        ResourceAction::Inspect => Outcome::Open(ResourceContext::Inspect {
            kind,
            id: target?,
            view: InspectView::Details,
        }),
        ResourceAction::History => Outcome::Open(ResourceContext::Inspect {
            kind,
            id: target?,
            view: InspectView::History,
        }),
        ResourceAction::Logs => Outcome::Open(ResourceContext::Logs { container: target? }),
        _ => {
            let target = if action.needs_target() { target } else { None };
            let request = ActionRequest {
                kind,
                action,
                target,
            };
            if action.needs_confirmation() {
                let (title, message) = confirmation(&request);
                Outcome::Confirm {
                    title,
                    message,
                    request,
                }
            } else {
                Outcome::Run(request)
            }
        }
    };
    Some(outcome)
}

fn confirmation(request: &ActionRequest) -> (String, String) {
    match request.action {
        ResourceAction::Prune => ("Prune".to_string(), prune_message(request.kind).to_string()),
        ResourceAction::Save => ("Save".to_string(), "Create Image Tarball".to_string()),
        action => {
            let mut title = action.label().to_string();
            title[..1].make_ascii_uppercase();
            let message = format!(
                "This will {action} {} {}",
                request.kind.noun(),
                request.target.as_deref().unwrap_or_default()
            );
            (title, message)
        }
    }
}

fn prune_message(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Containers => "This will remove all stopped containers",
        ResourceKind::Images => "This will remove all dangling images",
        ResourceKind::Volumes => "This will remove all unused volumes",
    }
}
