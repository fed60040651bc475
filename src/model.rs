use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

pub const NOT_AVAILABLE: &str = "N/A";
pub const NO_DATA: &str = "No data available";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Tab {
    Commits,
    Images,
    Workloads,
}

impl Tab {
    pub const ALL: [Self; 3] = [Self::Commits, Self::Images, Self::Workloads];

    pub fn title(self) -> &'static str {
        match self {
            Self::Commits => "Commits",
            Self::Images => "Images",
            Self::Workloads => "Workloads",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Commits => 0,
            Self::Images => 1,
            Self::Workloads => 2,
        }
    }

    pub fn from_digit(digit: char) -> Option<Self> {
        match digit {
            '1' => Some(Self::Commits),
            '2' => Some(Self::Images),
            '3' => Some(Self::Workloads),
            _ => None,
        }
    }

    pub fn offset(self, delta: isize) -> Self {
        let len = Self::ALL.len() as isize;
        let next = (self.index() as isize + delta).rem_euclid(len) as usize;
        Self::ALL[next]
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Self::Commits => &COMMIT_COLUMNS,
            Self::Images => &IMAGE_COLUMNS,
            Self::Workloads => &WORKLOAD_COLUMNS,
        }
    }
}

impl Display for Tab {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Column {
    pub title: &'static str,
    pub width: usize,
}

const fn column(title: &'static str, width: usize) -> Column {
    Column { title, width }
}

pub const COMMIT_COLUMNS: [Column; 4] = [
    column("Commit SHA", 42),
    column("Description", 40),
    column("Author", 20),
    column("Pushed At", 20),
];

pub const IMAGE_COLUMNS: [Column; 5] = [
    column("Image ID", 20),
    column("Repository", 30),
    column("Tag", 15),
    column("Size", 12),
    column("Created", 25),
];

pub const WORKLOAD_COLUMNS: [Column; 6] = [
    column("Pod Name", 35),
    column("Namespace", 15),
    column("Status", 12),
    column("Restarts", 10),
    column("Age", 15),
    column("Node", 20),
];

pub const DETAIL_COLUMNS: [Column; 2] = [column("Key", 35), column("Value", 70)];

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub author: Option<String>,
    pub pushed_at: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImageRecord {
    pub id: String,
    /// Full `registry/repository:tag` reference, absent for dangling images.
    pub reference: Option<String>,
    pub size: String,
    pub created_at: String,
}

impl ImageRecord {
    /// The reference used to deploy the image, falling back to its id.
    pub fn deploy_reference(&self) -> String {
        self.pull_reference()
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone())
    }

    pub fn pull_reference(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != NOT_AVAILABLE)
    }
}

/// One pod row of the Workloads tab.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkloadRecord {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub restarts: String,
    pub age: String,
    pub node: String,
}

impl WorkloadRecord {
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// A deployment offered as a target by the deploy wizard.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkloadSummary {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub replica_fraction: String,
}

pub type DetailMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommitRow {
    pub sha: String,
    pub description: String,
    pub author: String,
    pub pushed_at: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImageRow {
    pub id: String,
    pub repository: String,
    pub tag: String,
    pub size: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkloadRow {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub restarts: String,
    pub age: String,
    pub node: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Row {
    Commit(CommitRow),
    Image(ImageRow),
    Workload(WorkloadRow),
}

impl Row {
    pub fn cells(&self) -> Vec<String> {
        match self {
            Self::Commit(row) => vec![
                row.sha.clone(),
                row.description.clone(),
                row.author.clone(),
                row.pushed_at.clone(),
            ],
            Self::Image(row) => vec![
                row.id.clone(),
                row.repository.clone(),
                row.tag.clone(),
                row.size.clone(),
                row.created_at.clone(),
            ],
            Self::Workload(row) => vec![
                row.name.clone(),
                row.namespace.clone(),
                row.status.clone(),
                row.restarts.clone(),
                row.age.clone(),
                row.node.clone(),
            ],
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DetailRow {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

/// Selection and scroll offset of one table.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TableCursor {
    pub selected: usize,
    pub offset: usize,
}

impl TableCursor {
    pub fn clamp(&mut self, len: usize, window: usize) {
        let window = window.max(1);
        self.selected = self.selected.min(len.saturating_sub(1));
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if self.selected >= self.offset + window {
            self.offset = self.selected + 1 - window;
        }
        self.offset = self.offset.min(len.saturating_sub(window));
    }

    pub fn move_by(&mut self, delta: isize, len: usize, window: usize) {
        if len == 0 {
            self.selected = 0;
            self.offset = 0;
            return;
        }
        let max_index = len.saturating_sub(1) as isize;
        let current = self.selected.min(max_index as usize) as isize;
        self.selected = (current + delta).clamp(0, max_index) as usize;
        self.clamp(len, window);
    }
}
