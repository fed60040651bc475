use crate::input::Action;
use crate::model::{
    CommitRecord, DetailMap, DetailRow, ImageRecord, Row, Tab, TableCursor, Viewport,
    WorkloadRecord, WorkloadSummary,
};
use crate::projector::{detail_rows, project, workload_name};
use std::collections::BTreeMap;

/// Rows taken by the tab bar, key hints, footer, table borders and header.
const MAIN_CHROME_ROWS: u16 = 6;
/// The detail view adds a title line above its table.
const DETAIL_CHROME_ROWS: u16 = 7;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Modal,
    Detail,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ModalStep {
    SelectTarget,
    CreateConfirm,
    UpdateConfirm,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum OperationKind {
    Delete,
    Pull,
    Detail,
    CreateWorkload,
    UpdateWorkload,
    RefreshImages,
    ListWorkloads,
    RefreshWorkloads,
    WorkloadPods,
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    ListWorkloads {
        namespace: String,
    },
    WorkloadPods {
        name: String,
        namespace: String,
    },
    RefreshImages,
    RefreshWorkloads {
        namespace: String,
    },
    DeleteImage {
        id: String,
    },
    PullImage {
        reference: String,
    },
    FetchDetail {
        name: String,
        namespace: String,
    },
    CreateWorkload {
        image: String,
        name: String,
        namespace: String,
    },
    UpdateWorkload {
        image: String,
        name: String,
        namespace: String,
    },
}

impl AppCommand {
    pub fn operation(&self) -> PendingOperation {
        let (kind, target) = match self {
            Self::ListWorkloads { namespace } => (OperationKind::ListWorkloads, namespace.clone()),
            Self::WorkloadPods { name, namespace } => {
                (OperationKind::WorkloadPods, format!("{namespace}/{name}"))
            }
            Self::RefreshImages => (OperationKind::RefreshImages, String::new()),
            Self::RefreshWorkloads { namespace } => {
                (OperationKind::RefreshWorkloads, namespace.clone())
            }
            Self::DeleteImage { id } => (OperationKind::Delete, id.clone()),
            Self::PullImage { reference } => (OperationKind::Pull, reference.clone()),
            Self::FetchDetail { name, namespace } => {
                (OperationKind::Detail, format!("{namespace}/{name}"))
            }
            Self::CreateWorkload {
                name, namespace, ..
            } => (OperationKind::CreateWorkload, format!("{namespace}/{name}")),
            Self::UpdateWorkload {
                name, namespace, ..
            } => (OperationKind::UpdateWorkload, format!("{namespace}/{name}")),
        };
        PendingOperation { kind, target }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::ListWorkloads { namespace } => format!("List deployments in {namespace}"),
            Self::WorkloadPods { name, namespace } => {
                format!("List pods of {namespace}/{name}")
            }
            Self::RefreshImages => "Refresh images".to_string(),
            Self::RefreshWorkloads { namespace } => format!("Refresh pods in {namespace}"),
            Self::DeleteImage { id } => format!("Delete image {id}"),
            Self::PullImage { reference } => format!("Pull {reference}"),
            Self::FetchDetail { name, namespace } => {
                format!("Load pod details for {namespace}/{name}")
            }
            Self::CreateWorkload {
                image,
                name,
                namespace,
            } => format!("Create deployment {namespace}/{name} from {image}"),
            Self::UpdateWorkload {
                image,
                name,
                namespace,
            } => format!("Update deployment {namespace}/{name} to {image}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    Images(Vec<ImageRecord>),
    Workloads(Vec<WorkloadSummary>),
    Pods(Vec<WorkloadRecord>),
    Detail(DetailMap),
}

/// The single result reported back for one dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub command: AppCommand,
    pub outcome: Result<Payload, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Input(Action),
    Resize { width: u16, height: u16 },
    Tick,
    Completed(Completion),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployWizard {
    pub image: String,
    pub step: ModalStep,
    /// `None` highlights the "create new deployment" entry.
    pub cursor: Option<usize>,
    pub target: Option<WorkloadSummary>,
    pub target_pods: Vec<WorkloadRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    pub name: String,
    pub namespace: String,
    /// `None` until the detail lookup completes.
    pub rows: Option<Vec<DetailRow>>,
    pub cursor: TableCursor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Overlay {
    None,
    Wizard(DeployWizard),
    Detail(DetailView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    running: bool,
    active_tab: Tab,
    namespace: String,
    commits: Vec<CommitRecord>,
    images: Vec<ImageRecord>,
    workloads: Vec<WorkloadRecord>,
    rows: Vec<Row>,
    cursors: [TableCursor; 3],
    candidates: Vec<WorkloadSummary>,
    overlay: Overlay,
    pending: BTreeMap<PendingOperation, usize>,
    viewport: Viewport,
    status: String,
}

/// Applies one event to `state`, returning the next state and the commands
/// the host must dispatch.
pub fn transition(mut state: App, event: AppEvent) -> (App, Vec<AppCommand>) {
    let commands = state.apply(event);
    (state, commands)
}

impl App {
    pub fn new(
        namespace: impl Into<String>,
        commits: Vec<CommitRecord>,
        images: Vec<ImageRecord>,
        workloads: Vec<WorkloadRecord>,
    ) -> Self {
        let active_tab = Tab::Commits;
        let rows = project(active_tab, &commits, &images, &workloads);
        Self {
            running: true,
            active_tab,
            namespace: namespace.into(),
            commits,
            images,
            workloads,
            rows,
            cursors: [TableCursor::default(); 3],
            candidates: Vec::new(),
            overlay: Overlay::None,
            pending: BTreeMap::new(),
            viewport: Viewport::default(),
            status: "Ready".to_string(),
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        match self.overlay {
            Overlay::None => InputMode::Normal,
            Overlay::Wizard(_) => InputMode::Modal,
            Overlay::Detail(_) => InputMode::Detail,
        }
    }

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn commits(&self) -> &[CommitRecord] {
        &self.commits
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn workloads(&self) -> &[WorkloadRecord] {
        &self.workloads
    }

    pub fn candidates(&self) -> &[WorkloadSummary] {
        &self.candidates
    }

    pub fn wizard(&self) -> Option<&DeployWizard> {
        match &self.overlay {
            Overlay::Wizard(wizard) => Some(wizard),
            _ => None,
        }
    }

    pub fn detail(&self) -> Option<&DetailView> {
        match &self.overlay {
            Overlay::Detail(view) => Some(view),
            _ => None,
        }
    }

    /// In-flight commands, counting duplicates of the same operation.
    pub fn pending_count(&self) -> usize {
        self.pending.values().sum()
    }

    pub fn is_pending(&self, kind: OperationKind) -> bool {
        self.pending.keys().any(|operation| operation.kind == kind)
    }

    pub fn selected_index(&self) -> usize {
        self.cursors[self.active_tab.index()].selected
    }

    /// The rows that fit the viewport and the selection relative to them.
    pub fn visible_rows(&self) -> (&[Row], usize) {
        let cursor = self.cursors[self.active_tab.index()];
        let window = self.table_window();
        let start = cursor.offset.min(self.rows.len());
        let end = (start + window).min(self.rows.len());
        (&self.rows[start..end], cursor.selected.saturating_sub(start))
    }

    pub fn visible_detail_rows(&self) -> Option<(&[DetailRow], usize)> {
        let view = self.detail()?;
        let rows = view.rows.as_deref()?;
        let window = self.detail_window();
        let start = view.cursor.offset.min(rows.len());
        let end = (start + window).min(rows.len());
        Some((&rows[start..end], view.cursor.selected.saturating_sub(start)))
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = normalize_status_text(status.into());
    }

    pub fn apply(&mut self, event: AppEvent) -> Vec<AppCommand> {
        if !self.running {
            return Vec::new();
        }

        let commands = match event {
            AppEvent::Input(action) => self.apply_action(action),
            AppEvent::Resize { width, height } => {
                self.set_viewport(width, height);
                Vec::new()
            }
            AppEvent::Tick => self.on_tick(),
            AppEvent::Completed(completion) => self.on_completion(completion),
        };

        for command in &commands {
            *self.pending.entry(command.operation()).or_insert(0) += 1;
        }
        commands
    }

    fn apply_action(&mut self, action: Action) -> Vec<AppCommand> {
        match self.mode() {
            InputMode::Normal => self.apply_normal_action(action),
            InputMode::Modal => self.apply_wizard_action(action),
            InputMode::Detail => {
                self.apply_detail_action(action);
                Vec::new()
            }
        }
    }

    fn apply_normal_action(&mut self, action: Action) -> Vec<AppCommand> {
        match action {
            Action::Quit => {
                self.running = false;
                self.status = "Exit requested".to_string();
                Vec::new()
            }
            Action::SelectTab(tab) => {
                self.switch_tab(tab);
                Vec::new()
            }
            Action::NextTab => {
                self.switch_tab(self.active_tab.offset(1));
                Vec::new()
            }
            Action::PrevTab => {
                self.switch_tab(self.active_tab.offset(-1));
                Vec::new()
            }
            Action::Down => self.move_selection(1),
            Action::Up => self.move_selection(-1),
            Action::PageDown => self.move_selection(self.table_window() as isize),
            Action::PageUp => self.move_selection(-(self.table_window() as isize)),
            Action::Top => self.move_selection(isize::MIN / 2),
            Action::Bottom => self.move_selection(isize::MAX / 2),
            Action::Open => match self.active_tab {
                Tab::Images => self.open_wizard(),
                Tab::Workloads => self.open_detail(),
                Tab::Commits => Vec::new(),
            },
            Action::DeleteImage => self.request_delete(),
            Action::PullImage => self.request_pull(),
            Action::Refresh => self.request_refresh(),
            Action::Close | Action::Advance | Action::Back => Vec::new(),
        }
    }

    fn apply_wizard_action(&mut self, action: Action) -> Vec<AppCommand> {
        let Overlay::Wizard(wizard) = &mut self.overlay else {
            return Vec::new();
        };

        match (action, wizard.step) {
            (Action::Close, _) | (Action::Back, ModalStep::SelectTarget) => {
                self.close_wizard("Deployment cancelled");
                Vec::new()
            }
            (Action::Back, ModalStep::CreateConfirm | ModalStep::UpdateConfirm) => {
                wizard.step = ModalStep::SelectTarget;
                wizard.target = None;
                wizard.target_pods.clear();
                Vec::new()
            }
            (Action::Down, ModalStep::SelectTarget) => {
                let len = self.candidates.len();
                wizard.cursor = match wizard.cursor {
                    None if len > 0 => Some(0),
                    Some(index) if index + 1 < len => Some(index + 1),
                    other => other,
                };
                Vec::new()
            }
            (Action::Up, ModalStep::SelectTarget) => {
                wizard.cursor = match wizard.cursor {
                    Some(0) | None => None,
                    Some(index) => Some(index - 1),
                };
                Vec::new()
            }
            (Action::Advance, ModalStep::SelectTarget) => {
                let target = wizard
                    .cursor
                    .and_then(|index| self.candidates.get(index))
                    .cloned();
                match target {
                    None => {
                        wizard.step = ModalStep::CreateConfirm;
                        Vec::new()
                    }
                    Some(target) => {
                        wizard.step = ModalStep::UpdateConfirm;
                        let command = AppCommand::WorkloadPods {
                            name: target.name.clone(),
                            namespace: target.namespace.clone(),
                        };
                        wizard.target = Some(target);
                        vec![command]
                    }
                }
            }
            (Action::Advance, ModalStep::CreateConfirm) => {
                let image = wizard.image.clone();
                let name = workload_name(&image);
                let namespace = self.namespace.clone();
                self.close_wizard(format!("Creating deployment {namespace}/{name}…"));
                vec![AppCommand::CreateWorkload {
                    image,
                    name,
                    namespace,
                }]
            }
            (Action::Advance, ModalStep::UpdateConfirm) => {
                let image = wizard.image.clone();
                let Some(target) = wizard.target.clone() else {
                    wizard.step = ModalStep::SelectTarget;
                    return Vec::new();
                };
                self.close_wizard(format!(
                    "Updating deployment {}/{}…",
                    target.namespace, target.name
                ));
                vec![AppCommand::UpdateWorkload {
                    image,
                    name: target.name,
                    namespace: target.namespace,
                }]
            }
            _ => Vec::new(),
        }
    }

    fn apply_detail_action(&mut self, action: Action) {
        let window = self.detail_window();
        let Overlay::Detail(view) = &mut self.overlay else {
            return;
        };
        let len = view.rows.as_ref().map(Vec::len).unwrap_or(0);

        match action {
            Action::Close => {
                self.overlay = Overlay::None;
                self.status = "Closed pod details".to_string();
            }
            Action::Down => view.cursor.move_by(1, len, window),
            Action::Up => view.cursor.move_by(-1, len, window),
            Action::PageDown => view.cursor.move_by(window as isize, len, window),
            Action::PageUp => view.cursor.move_by(-(window as isize), len, window),
            Action::Top => view.cursor.move_by(isize::MIN / 2, len, window),
            Action::Bottom => view.cursor.move_by(isize::MAX / 2, len, window),
            _ => {}
        }
    }

    fn on_tick(&mut self) -> Vec<AppCommand> {
        if self.is_pending(OperationKind::RefreshWorkloads) {
            return Vec::new();
        }
        vec![AppCommand::RefreshWorkloads {
            namespace: self.namespace.clone(),
        }]
    }

    fn on_completion(&mut self, completion: Completion) -> Vec<AppCommand> {
        let Completion { command, outcome } = completion;
        self.finish_operation(command.operation());

        match (command, outcome) {
            (AppCommand::FetchDetail { name, namespace }, outcome) => {
                let details = match outcome {
                    Ok(Payload::Detail(details)) => Ok(details),
                    Ok(_) => Err("unexpected response".to_string()),
                    Err(error) => Err(error),
                };
                if let Overlay::Detail(view) = &mut self.overlay
                    && view.name == name
                    && view.namespace == namespace
                {
                    view.rows = Some(detail_rows(&details));
                    view.cursor = TableCursor::default();
                }
                if let Err(error) = details {
                    self.set_status(format!(
                        "Pod details failed for {namespace}/{name}: {}",
                        summarize_error_line(&error)
                    ));
                }
                Vec::new()
            }
            (AppCommand::ListWorkloads { .. }, Ok(Payload::Workloads(candidates))) => {
                self.set_candidates(candidates);
                Vec::new()
            }
            (AppCommand::WorkloadPods { name, namespace }, Ok(Payload::Pods(pods))) => {
                if let Overlay::Wizard(wizard) = &mut self.overlay
                    && wizard.step == ModalStep::UpdateConfirm
                    && let Some(target) = wizard.target.as_ref()
                    && target.name == name
                    && target.namespace == namespace
                {
                    wizard.target_pods = pods;
                }
                Vec::new()
            }
            (AppCommand::RefreshImages, Ok(Payload::Images(images))) => {
                let count = images.len();
                let previous_key = self.selected_key_for(Tab::Images);
                self.images = images;
                self.after_records_replaced(Tab::Images, previous_key);
                self.set_status(format!("Images updated ({count})"));
                Vec::new()
            }
            (AppCommand::RefreshWorkloads { .. }, Ok(Payload::Pods(pods))) => {
                let previous_key = self.selected_key_for(Tab::Workloads);
                self.workloads = pods;
                self.after_records_replaced(Tab::Workloads, previous_key);
                Vec::new()
            }
            (AppCommand::DeleteImage { id }, Ok(_)) => {
                self.set_status(format!("Deleted image {id}"));
                vec![AppCommand::RefreshImages]
            }
            (AppCommand::PullImage { reference }, Ok(_)) => {
                self.set_status(format!("Pulled {reference}"));
                vec![AppCommand::RefreshImages]
            }
            (
                AppCommand::CreateWorkload {
                    name, namespace, ..
                },
                Ok(_),
            ) => {
                self.set_status(format!("Created deployment {namespace}/{name}"));
                self.after_workload_mutation()
            }
            (
                AppCommand::UpdateWorkload {
                    name, namespace, ..
                },
                Ok(_),
            ) => {
                self.set_status(format!("Updated deployment {namespace}/{name}"));
                self.after_workload_mutation()
            }
            (command, Err(error)) => {
                self.set_status(format!(
                    "{} failed: {}",
                    command.describe(),
                    summarize_error_line(&error)
                ));
                Vec::new()
            }
            (command, Ok(_)) => {
                self.set_status(format!("{}: unexpected response", command.describe()));
                Vec::new()
            }
        }
    }

    fn finish_operation(&mut self, operation: PendingOperation) {
        if let Some(count) = self.pending.get_mut(&operation) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(&operation);
            }
        }
    }

    fn after_workload_mutation(&mut self) -> Vec<AppCommand> {
        let window = self.table_window();
        let len = self.rows.len();
        let cursor = &mut self.cursors[self.active_tab.index()];
        *cursor = TableCursor::default();
        cursor.clamp(len, window);
        vec![
            AppCommand::ListWorkloads {
                namespace: self.namespace.clone(),
            },
            AppCommand::RefreshWorkloads {
                namespace: self.namespace.clone(),
            },
        ]
    }

    fn open_wizard(&mut self) -> Vec<AppCommand> {
        let Some(image) = self.images.get(self.selected_index()) else {
            self.set_status("No image selected");
            return Vec::new();
        };

        let image = image.deploy_reference();
        self.set_status(format!("Deploy {image}"));
        self.overlay = Overlay::Wizard(DeployWizard {
            image,
            step: ModalStep::SelectTarget,
            cursor: None,
            target: None,
            target_pods: Vec::new(),
        });
        vec![AppCommand::ListWorkloads {
            namespace: self.namespace.clone(),
        }]
    }

    fn close_wizard(&mut self, status: impl Into<String>) {
        self.overlay = Overlay::None;
        self.set_status(status);
    }

    fn open_detail(&mut self) -> Vec<AppCommand> {
        let Some(workload) = self.workloads.get(self.selected_index()) else {
            self.set_status("No pod selected");
            return Vec::new();
        };

        let name = workload.name.clone();
        let namespace = workload.namespace.clone();
        self.set_status(format!("Loading pod details for {namespace}/{name}…"));
        self.overlay = Overlay::Detail(DetailView {
            name: name.clone(),
            namespace: namespace.clone(),
            rows: None,
            cursor: TableCursor::default(),
        });
        vec![AppCommand::FetchDetail { name, namespace }]
    }

    fn request_delete(&mut self) -> Vec<AppCommand> {
        if self.active_tab != Tab::Images {
            return Vec::new();
        }
        let Some(image) = self.images.get(self.selected_index()) else {
            return Vec::new();
        };

        let id = image.id.clone();
        self.set_status(format!("Deleting image {id}…"));
        vec![AppCommand::DeleteImage { id }]
    }

    fn request_pull(&mut self) -> Vec<AppCommand> {
        if self.active_tab != Tab::Images {
            return Vec::new();
        }
        let Some(image) = self.images.get(self.selected_index()) else {
            return Vec::new();
        };
        let Some(reference) = image.pull_reference().map(str::to_string) else {
            self.set_status("Selected image has no tag to pull");
            return Vec::new();
        };

        self.set_status(format!("Pulling {reference}…"));
        vec![AppCommand::PullImage { reference }]
    }

    fn request_refresh(&mut self) -> Vec<AppCommand> {
        match self.active_tab {
            Tab::Commits => {
                self.set_status("Commits are loaded once at startup");
                Vec::new()
            }
            Tab::Images => {
                self.set_status("Refreshing images…");
                vec![AppCommand::RefreshImages]
            }
            Tab::Workloads => {
                self.set_status("Refreshing pods…");
                vec![AppCommand::RefreshWorkloads {
                    namespace: self.namespace.clone(),
                }]
            }
        }
    }

    fn set_candidates(&mut self, candidates: Vec<WorkloadSummary>) {
        let len = candidates.len();
        self.candidates = candidates;
        if let Overlay::Wizard(wizard) = &mut self.overlay {
            wizard.cursor = match wizard.cursor {
                Some(_) if len == 0 => None,
                Some(index) => Some(index.min(len - 1)),
                None => None,
            };
        }
    }

    fn switch_tab(&mut self, tab: Tab) {
        self.active_tab = tab;
        self.rows = project(tab, &self.commits, &self.images, &self.workloads);
        let window = self.table_window();
        let len = self.rows.len();
        self.cursors[tab.index()].clamp(len, window);
    }

    fn move_selection(&mut self, delta: isize) -> Vec<AppCommand> {
        let window = self.table_window();
        let len = self.rows.len();
        self.cursors[self.active_tab.index()].move_by(delta, len, window);
        Vec::new()
    }

    fn set_viewport(&mut self, width: u16, height: u16) {
        self.viewport = Viewport {
            width: width.max(1),
            height: height.max(1),
        };

        let window = self.table_window();
        let len = self.rows.len();
        self.cursors[self.active_tab.index()].clamp(len, window);

        let detail_window = self.detail_window();
        if let Overlay::Detail(view) = &mut self.overlay
            && let Some(rows) = view.rows.as_ref()
        {
            view.cursor.clamp(rows.len(), detail_window);
        }
    }

    fn after_records_replaced(&mut self, tab: Tab, previous_key: Option<String>) {
        let keys = self.record_keys(tab);
        let previous = self.cursors[tab.index()].selected;
        let selected = previous_key
            .and_then(|key| {
                keys.iter()
                    .enumerate()
                    .filter(|(_, candidate)| **candidate == key)
                    .map(|(index, _)| index)
                    .min_by_key(|index| index.abs_diff(previous))
            })
            .unwrap_or(previous);

        if tab == self.active_tab {
            self.rows = project(tab, &self.commits, &self.images, &self.workloads);
        }

        let window = self.table_window();
        let cursor = &mut self.cursors[tab.index()];
        cursor.selected = selected;
        cursor.clamp(keys.len().max(1), window);
    }

    fn selected_key_for(&self, tab: Tab) -> Option<String> {
        self.record_keys(tab)
            .into_iter()
            .nth(self.cursors[tab.index()].selected)
    }

    fn record_keys(&self, tab: Tab) -> Vec<String> {
        match tab {
            Tab::Commits => self.commits.iter().map(|commit| commit.sha.clone()).collect(),
            Tab::Images => self.images.iter().map(|image| image.id.clone()).collect(),
            Tab::Workloads => self.workloads.iter().map(WorkloadRecord::key).collect(),
        }
    }

    fn table_window(&self) -> usize {
        self.viewport.height.saturating_sub(MAIN_CHROME_ROWS).max(1) as usize
    }

    fn detail_window(&self) -> usize {
        self.viewport.height.saturating_sub(DETAIL_CHROME_ROWS).max(1) as usize
    }
}

fn summarize_error_line(error: &str) -> String {
    error
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn normalize_status_text(status: String) -> String {
    const MAX_STATUS_LEN: usize = 180;
    let status = status.replace(['\n', '\r'], " ");
    if status.chars().count() <= MAX_STATUS_LEN {
        return status;
    }

    let mut shortened = status
        .chars()
        .take(MAX_STATUS_LEN.saturating_sub(1))
        .collect::<String>();
    shortened.push('…');
    shortened
}

#[cfg(test)]
mod tests {
    use super::{
        App, AppCommand, AppEvent, Completion, InputMode, ModalStep, OperationKind, Payload,
        transition,
    };
    use crate::input::Action;
    use crate::model::{
        CommitRecord, DetailMap, ImageRecord, Row, Tab, WorkloadRecord, WorkloadSummary,
    };

    fn image(id: &str, reference: &str) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            reference: Some(reference.to_string()),
            size: "10MB".to_string(),
            created_at: "2024-01-01 10:00:00".to_string(),
        }
    }

    fn pod(name: &str) -> WorkloadRecord {
        WorkloadRecord {
            name: name.to_string(),
            namespace: "default".to_string(),
            status: "Running".to_string(),
            restarts: "0".to_string(),
            age: "1h".to_string(),
            node: "node-a".to_string(),
        }
    }

    fn deployment(name: &str) -> WorkloadSummary {
        WorkloadSummary {
            name: name.to_string(),
            namespace: "default".to_string(),
            status: "Ready".to_string(),
            replica_fraction: "1/1".to_string(),
        }
    }

    fn commit(sha: &str) -> CommitRecord {
        CommitRecord {
            sha: sha.to_string(),
            message: "Fix things\n\nLonger body".to_string(),
            author: Some("dev".to_string()),
            pushed_at: Some("2024-01-01 10:00:00".to_string()),
        }
    }

    fn app_with_image() -> App {
        let mut app = App::new(
            "default",
            vec![commit("c1")],
            vec![image("abc123", "localhost:5000/app:v1")],
            vec![pod("web-1")],
        );
        app.apply(AppEvent::Resize {
            width: 120,
            height: 40,
        });
        app
    }

    fn press(app: &mut App, action: Action) -> Vec<AppCommand> {
        app.apply(AppEvent::Input(action))
    }

    fn complete(app: &mut App, command: AppCommand, outcome: Result<Payload, String>) -> Vec<AppCommand> {
        app.apply(AppEvent::Completed(Completion { command, outcome }))
    }

    #[test]
    fn tab_selection_follows_last_selected_tab() {
        let mut app = app_with_image();
        let sequence = [
            Action::SelectTab(Tab::Workloads),
            Action::SelectTab(Tab::Images),
            Action::NextTab,
            Action::SelectTab(Tab::Commits),
            Action::SelectTab(Tab::Images),
        ];
        for action in sequence {
            assert!(press(&mut app, action).is_empty());
        }

        assert_eq!(app.active_tab(), Tab::Images);
        assert!(app.rows().iter().all(|row| matches!(row, Row::Image(_))));
        assert_eq!(app.rows()[0].cells().len(), Tab::Images.columns().len());
    }

    #[test]
    fn transition_is_deterministic() {
        let app = app_with_image();
        let events = [
            AppEvent::Input(Action::SelectTab(Tab::Images)),
            AppEvent::Input(Action::Open),
            AppEvent::Tick,
            AppEvent::Resize {
                width: 80,
                height: 20,
            },
        ];

        let mut left = app.clone();
        let mut right = app;
        for event in events {
            let (next_left, left_commands) = transition(left, event.clone());
            let (next_right, right_commands) = transition(right, event);
            assert_eq!(next_left, next_right);
            assert_eq!(left_commands, right_commands);
            left = next_left;
            right = next_right;
        }
    }

    #[test]
    fn create_flow_with_no_existing_workloads() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Images));

        let commands = press(&mut app, Action::Open);
        assert_eq!(
            commands,
            vec![AppCommand::ListWorkloads {
                namespace: "default".to_string()
            }]
        );
        assert_eq!(app.mode(), InputMode::Modal);

        complete(
            &mut app,
            AppCommand::ListWorkloads {
                namespace: "default".to_string(),
            },
            Ok(Payload::Workloads(Vec::new())),
        );
        let wizard = app.wizard().cloned().unwrap();
        assert_eq!(wizard.step, ModalStep::SelectTarget);
        assert_eq!(wizard.cursor, None);
        assert!(app.candidates().is_empty());

        assert!(press(&mut app, Action::Advance).is_empty());
        assert_eq!(app.wizard().unwrap().step, ModalStep::CreateConfirm);

        let commands = press(&mut app, Action::Advance);
        assert_eq!(
            commands,
            vec![AppCommand::CreateWorkload {
                image: "localhost:5000/app:v1".to_string(),
                name: "app-v1".to_string(),
                namespace: "default".to_string(),
            }]
        );
        assert_eq!(app.mode(), InputMode::Normal);
        assert!(app.wizard().is_none());
    }

    #[test]
    fn update_flow_targets_highlighted_deployment() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Images));
        press(&mut app, Action::Open);
        complete(
            &mut app,
            AppCommand::ListWorkloads {
                namespace: "default".to_string(),
            },
            Ok(Payload::Workloads(vec![deployment("api"), deployment("web")])),
        );

        press(&mut app, Action::Down);
        press(&mut app, Action::Down);
        press(&mut app, Action::Down);
        assert_eq!(app.wizard().unwrap().cursor, Some(1));

        let commands = press(&mut app, Action::Advance);
        assert_eq!(app.wizard().unwrap().step, ModalStep::UpdateConfirm);
        assert_eq!(
            commands,
            vec![AppCommand::WorkloadPods {
                name: "web".to_string(),
                namespace: "default".to_string(),
            }]
        );

        complete(
            &mut app,
            AppCommand::WorkloadPods {
                name: "web".to_string(),
                namespace: "default".to_string(),
            },
            Ok(Payload::Pods(vec![pod("web-1")])),
        );
        assert_eq!(app.wizard().unwrap().target_pods.len(), 1);

        let commands = press(&mut app, Action::Advance);
        assert_eq!(
            commands,
            vec![AppCommand::UpdateWorkload {
                image: "localhost:5000/app:v1".to_string(),
                name: "web".to_string(),
                namespace: "default".to_string(),
            }]
        );
        assert_eq!(app.mode(), InputMode::Normal);
    }

    #[test]
    fn wizard_steps_never_skip() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Images));
        press(&mut app, Action::Open);

        press(&mut app, Action::Advance);
        assert_eq!(app.wizard().unwrap().step, ModalStep::CreateConfirm);
        press(&mut app, Action::Back);
        assert_eq!(app.wizard().unwrap().step, ModalStep::SelectTarget);

        complete(
            &mut app,
            AppCommand::ListWorkloads {
                namespace: "default".to_string(),
            },
            Ok(Payload::Workloads(vec![deployment("api")])),
        );
        press(&mut app, Action::Down);
        press(&mut app, Action::Advance);
        assert_eq!(app.wizard().unwrap().step, ModalStep::UpdateConfirm);
        press(&mut app, Action::Back);
        let wizard = app.wizard().unwrap();
        assert_eq!(wizard.step, ModalStep::SelectTarget);
        assert!(wizard.target.is_none());

        press(&mut app, Action::Back);
        assert!(app.wizard().is_none());
    }

    #[test]
    fn escape_closes_wizard_without_commands() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Images));
        press(&mut app, Action::Open);
        press(&mut app, Action::Advance);

        assert!(press(&mut app, Action::Close).is_empty());
        assert_eq!(app.mode(), InputMode::Normal);
        assert!(app.running());

        press(&mut app, Action::Open);
        let wizard = app.wizard().unwrap();
        assert_eq!(wizard.step, ModalStep::SelectTarget);
        assert_eq!(wizard.cursor, None);
    }

    #[test]
    fn successful_mutation_refreshes_workloads_and_resets_cursor() {
        let mut app = App::new(
            "default",
            Vec::new(),
            vec![image("a", "localhost:5000/a:v1"), image("b", "localhost:5000/b:v1")],
            Vec::new(),
        );
        app.apply(AppEvent::Resize {
            width: 120,
            height: 40,
        });
        press(&mut app, Action::SelectTab(Tab::Images));
        press(&mut app, Action::Down);
        assert_eq!(app.selected_index(), 1);

        for command in [
            AppCommand::CreateWorkload {
                image: "localhost:5000/b:v1".to_string(),
                name: "b-v1".to_string(),
                namespace: "default".to_string(),
            },
            AppCommand::UpdateWorkload {
                image: "localhost:5000/b:v1".to_string(),
                name: "web".to_string(),
                namespace: "default".to_string(),
            },
        ] {
            let follow_up = complete(&mut app, command, Ok(Payload::None));
            assert_eq!(app.selected_index(), 0);
            assert!(follow_up.contains(&AppCommand::ListWorkloads {
                namespace: "default".to_string()
            }));
            assert!(follow_up.contains(&AppCommand::RefreshWorkloads {
                namespace: "default".to_string()
            }));
        }
    }

    #[test]
    fn failed_mutation_only_records_status() {
        let mut app = app_with_image();
        let before = app.clone();
        let commands = complete(
            &mut app,
            AppCommand::CreateWorkload {
                image: "x".to_string(),
                name: "x".to_string(),
                namespace: "default".to_string(),
            },
            Err("deployments.apps \"x\" already exists".to_string()),
        );
        assert!(commands.is_empty());
        assert_eq!(app.mode(), InputMode::Normal);
        assert_eq!(app.rows(), before.rows());
        assert!(app.status().contains("already exists"));
    }

    #[test]
    fn delete_failure_keeps_images_and_skips_refresh() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Images));
        let commands = press(&mut app, Action::DeleteImage);
        assert_eq!(
            commands,
            vec![AppCommand::DeleteImage {
                id: "abc123".to_string()
            }]
        );
        assert!(app.is_pending(OperationKind::Delete));

        let images_before = app.images().to_vec();
        let follow_up = complete(
            &mut app,
            AppCommand::DeleteImage {
                id: "abc123".to_string(),
            },
            Err("image is being used by running container".to_string()),
        );
        assert!(follow_up.is_empty());
        assert_eq!(app.images(), images_before.as_slice());
        assert!(!app.is_pending(OperationKind::Delete));
    }

    #[test]
    fn delete_and_pull_success_refresh_images() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Images));

        let pull = press(&mut app, Action::PullImage);
        assert_eq!(
            pull,
            vec![AppCommand::PullImage {
                reference: "localhost:5000/app:v1".to_string()
            }]
        );
        let follow_up = complete(&mut app, pull[0].clone(), Ok(Payload::None));
        assert_eq!(follow_up, vec![AppCommand::RefreshImages]);

        let follow_up = complete(
            &mut app,
            AppCommand::DeleteImage {
                id: "abc123".to_string(),
            },
            Ok(Payload::None),
        );
        assert_eq!(follow_up, vec![AppCommand::RefreshImages]);
    }

    #[test]
    fn pull_requires_a_tag() {
        let mut app = App::new(
            "default",
            Vec::new(),
            vec![ImageRecord {
                id: "dangling".to_string(),
                reference: None,
                size: "1MB".to_string(),
                created_at: "now".to_string(),
            }],
            Vec::new(),
        );
        press(&mut app, Action::SelectTab(Tab::Images));
        assert!(press(&mut app, Action::PullImage).is_empty());
    }

    #[test]
    fn image_shortcuts_ignored_outside_images_tab() {
        let mut app = app_with_image();
        assert!(press(&mut app, Action::DeleteImage).is_empty());
        assert!(press(&mut app, Action::PullImage).is_empty());
    }

    #[test]
    fn refresh_replaces_images_and_keeps_selection_by_id() {
        let mut app = App::new(
            "default",
            Vec::new(),
            vec![image("a", "r/a:1"), image("b", "r/b:1"), image("c", "r/c:1")],
            Vec::new(),
        );
        app.apply(AppEvent::Resize {
            width: 120,
            height: 40,
        });
        press(&mut app, Action::SelectTab(Tab::Images));
        press(&mut app, Action::Down);
        press(&mut app, Action::Down);
        assert_eq!(app.selected_key_for(app.active_tab()).as_deref(), Some("c"));

        complete(
            &mut app,
            AppCommand::RefreshImages,
            Ok(Payload::Images(vec![image("c", "r/c:1"), image("d", "r/d:1")])),
        );
        assert_eq!(app.rows().len(), 2);
        assert_eq!(app.selected_key_for(app.active_tab()).as_deref(), Some("c"));
    }

    #[test]
    fn detail_view_populates_from_completion() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Workloads));

        let commands = press(&mut app, Action::Open);
        assert_eq!(
            commands,
            vec![AppCommand::FetchDetail {
                name: "web-1".to_string(),
                namespace: "default".to_string(),
            }]
        );
        assert_eq!(app.mode(), InputMode::Detail);
        assert!(app.detail().unwrap().rows.is_none());

        let mut details = DetailMap::new();
        details.insert("Name".to_string(), "web-1".to_string());
        details.insert("Namespace".to_string(), "default".to_string());
        complete(&mut app, commands[0].clone(), Ok(Payload::Detail(details)));
        assert_eq!(app.detail().unwrap().rows.as_ref().unwrap().len(), 2);

        press(&mut app, Action::Close);
        assert_eq!(app.mode(), InputMode::Normal);
        assert!(app.detail().is_none());
        assert!(app.running());
    }

    #[test]
    fn detail_failure_still_yields_rows() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Workloads));
        let commands = press(&mut app, Action::Open);

        complete(&mut app, commands[0].clone(), Err("connection refused".to_string()));
        let rows = app.detail().unwrap().rows.clone().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "Error");
    }

    #[test]
    fn stale_detail_completion_is_discarded() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Workloads));
        let commands = press(&mut app, Action::Open);
        press(&mut app, Action::Close);

        complete(&mut app, commands[0].clone(), Ok(Payload::Detail(DetailMap::new())));
        assert_eq!(app.mode(), InputMode::Normal);
    }

    #[test]
    fn quit_only_fires_from_normal() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Workloads));
        press(&mut app, Action::Open);
        press(&mut app, Action::Quit);
        assert!(app.running());

        press(&mut app, Action::Close);
        assert_eq!(app.mode(), InputMode::Normal);
        press(&mut app, Action::Quit);
        assert!(!app.running());
        assert!(press(&mut app, Action::Open).is_empty());
    }

    #[test]
    fn resize_keeps_selected_identity() {
        let pods = (0..100).map(|index| pod(&format!("pod-{index:03}"))).collect();
        let mut app = App::new("default", Vec::new(), Vec::new(), pods);
        app.apply(AppEvent::Resize {
            width: 120,
            height: 60,
        });
        press(&mut app, Action::SelectTab(Tab::Workloads));
        for _ in 0..40 {
            press(&mut app, Action::Down);
        }
        let selected = app.selected_key_for(app.active_tab());
        let (window_before, _) = app.visible_rows();
        let window_before = window_before.len();

        app.apply(AppEvent::Resize {
            width: 120,
            height: 20,
        });
        let (window_after, relative) = app.visible_rows();
        assert!(window_after.len() < window_before);
        assert_eq!(app.selected_key_for(app.active_tab()), selected);
        assert_eq!(
            window_after[relative].cells()[0],
            "pod-040".to_string()
        );
    }

    #[test]
    fn tick_skips_refresh_while_one_is_pending() {
        let mut app = app_with_image();
        assert_eq!(
            app.apply(AppEvent::Tick),
            vec![AppCommand::RefreshWorkloads {
                namespace: "default".to_string()
            }]
        );
        assert!(app.apply(AppEvent::Tick).is_empty());

        complete(
            &mut app,
            AppCommand::RefreshWorkloads {
                namespace: "default".to_string(),
            },
            Ok(Payload::Pods(vec![pod("web-2")])),
        );
        assert_eq!(app.workloads().len(), 1);
        assert_eq!(app.apply(AppEvent::Tick).len(), 1);
    }

    #[test]
    fn tick_counts_duplicate_refreshes_in_flight() {
        let mut app = app_with_image();
        let refresh = AppCommand::RefreshWorkloads {
            namespace: "default".to_string(),
        };
        assert_eq!(app.apply(AppEvent::Tick), vec![refresh.clone()]);

        let follow_up = complete(
            &mut app,
            AppCommand::CreateWorkload {
                image: "localhost:5000/app:v1".to_string(),
                name: "app-v1".to_string(),
                namespace: "default".to_string(),
            },
            Ok(Payload::None),
        );
        assert!(follow_up.contains(&refresh));
        assert_eq!(app.pending_count(), 3);

        complete(&mut app, refresh.clone(), Ok(Payload::Pods(vec![pod("web-1")])));
        assert!(app.is_pending(OperationKind::RefreshWorkloads));
        assert!(app.apply(AppEvent::Tick).is_empty());

        complete(&mut app, refresh.clone(), Ok(Payload::Pods(vec![pod("web-1")])));
        assert!(!app.is_pending(OperationKind::RefreshWorkloads));
        assert_eq!(app.apply(AppEvent::Tick), vec![refresh]);
    }

    #[test]
    fn shrinking_candidate_list_clamps_wizard_cursor() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Images));
        press(&mut app, Action::Open);
        let list = AppCommand::ListWorkloads {
            namespace: "default".to_string(),
        };
        complete(
            &mut app,
            list.clone(),
            Ok(Payload::Workloads(vec![
                deployment("api"),
                deployment("web"),
                deployment("worker"),
            ])),
        );
        for _ in 0..3 {
            press(&mut app, Action::Down);
        }
        assert_eq!(app.wizard().unwrap().cursor, Some(2));

        complete(
            &mut app,
            list.clone(),
            Ok(Payload::Workloads(vec![deployment("api")])),
        );
        assert_eq!(app.candidates().len(), 1);
        assert_eq!(app.wizard().unwrap().cursor, Some(0));

        complete(&mut app, list, Ok(Payload::Workloads(Vec::new())));
        assert_eq!(app.wizard().unwrap().cursor, None);
    }

    #[test]
    fn failed_candidate_listing_keeps_previous_list() {
        let mut app = app_with_image();
        press(&mut app, Action::SelectTab(Tab::Images));
        press(&mut app, Action::Open);
        let list = AppCommand::ListWorkloads {
            namespace: "default".to_string(),
        };
        complete(
            &mut app,
            list.clone(),
            Ok(Payload::Workloads(vec![deployment("api"), deployment("web")])),
        );
        press(&mut app, Action::Down);
        press(&mut app, Action::Down);

        let commands = complete(&mut app, list, Err("connection refused".to_string()));
        assert!(commands.is_empty());
        assert_eq!(
            app.candidates(),
            [deployment("api"), deployment("web")].as_slice()
        );
        assert_eq!(app.wizard().unwrap().cursor, Some(1));
        assert_eq!(app.mode(), InputMode::Modal);
    }

    #[test]
    fn pod_refresh_keeps_selection_by_namespace_and_name() {
        let mut app = App::new(
            "default",
            Vec::new(),
            Vec::new(),
            vec![pod("api-1"), pod("web-1"), pod("worker-1")],
        );
        app.apply(AppEvent::Resize {
            width: 120,
            height: 40,
        });
        press(&mut app, Action::SelectTab(Tab::Workloads));
        press(&mut app, Action::Down);
        assert_eq!(
            app.selected_key_for(app.active_tab()).as_deref(),
            Some("default/web-1")
        );

        complete(
            &mut app,
            AppCommand::RefreshWorkloads {
                namespace: "default".to_string(),
            },
            Ok(Payload::Pods(vec![
                pod("aaa-1"),
                pod("api-1"),
                pod("worker-1"),
                pod("web-1"),
            ])),
        );
        assert_eq!(app.selected_index(), 3);
        assert_eq!(
            app.selected_key_for(app.active_tab()).as_deref(),
            Some("default/web-1")
        );
    }

    #[test]
    fn mismatched_payload_is_a_no_op() {
        let mut app = app_with_image();
        let images_before = app.images().to_vec();
        let commands = complete(
            &mut app,
            AppCommand::RefreshImages,
            Ok(Payload::Workloads(Vec::new())),
        );
        assert!(commands.is_empty());
        assert_eq!(app.images(), images_before.as_slice());
    }

    #[test]
    fn empty_images_tab_shows_sentinel_and_ignores_open() {
        let mut app = App::new("default", Vec::new(), Vec::new(), Vec::new());
        press(&mut app, Action::SelectTab(Tab::Images));
        assert_eq!(app.rows().len(), 1);
        assert!(press(&mut app, Action::Open).is_empty());
        assert_eq!(app.mode(), InputMode::Normal);
    }
}
