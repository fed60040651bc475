use crate::model::{
    COMMIT_COLUMNS, CommitRecord, CommitRow, DETAIL_COLUMNS, DetailMap, DetailRow, IMAGE_COLUMNS,
    ImageRecord, ImageRow, NO_DATA, NOT_AVAILABLE, Row, Tab, WORKLOAD_COLUMNS, WorkloadRecord,
    WorkloadRow,
};

const ELLIPSIS: &str = "...";
const DEFAULT_WORKLOAD_NAME: &str = "new-deployment";
const WORKLOAD_NAME_PREFIX: &str = "app-";
const MAX_WORKLOAD_NAME_LEN: usize = 63;

/// Keys shown first in the pod detail table, in this order.
pub const DETAIL_KEY_ORDER: [&str; 27] = [
    "Name",
    "Namespace",
    "Status",
    "Node",
    "Pod IP",
    "Host IP",
    "Created",
    "Start Time",
    "Service Account",
    "Restart Policy",
    "DNS Policy",
    "Container Name",
    "Container Image",
    "Image Pull Policy",
    "Container Ports",
    "CPU Request",
    "Memory Request",
    "CPU Limit",
    "Memory Limit",
    "Container Ready",
    "Restart Count",
    "Container ID",
    "Ready Condition",
    "Scheduled Condition",
    "Initialized Condition",
    "Labels",
    "Annotations",
];

/// Cuts `value` to at most `width` characters, marking the cut with a
/// trailing ellipsis that counts toward the width.
pub fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }

    if width <= ELLIPSIS.len() {
        return ELLIPSIS.chars().take(width).collect();
    }

    let mut out = value
        .chars()
        .take(width - ELLIPSIS.len())
        .collect::<String>();
    out.push_str(ELLIPSIS);
    out
}

pub fn project(
    tab: Tab,
    commits: &[CommitRecord],
    images: &[ImageRecord],
    workloads: &[WorkloadRecord],
) -> Vec<Row> {
    let rows = match tab {
        Tab::Commits => commits
            .iter()
            .map(|commit| Row::Commit(commit_row(commit)))
            .collect::<Vec<_>>(),
        Tab::Images => images
            .iter()
            .map(|image| Row::Image(image_row(image)))
            .collect(),
        Tab::Workloads => workloads
            .iter()
            .map(|workload| Row::Workload(workload_row(workload)))
            .collect(),
    };

    if rows.is_empty() {
        vec![placeholder_row(tab)]
    } else {
        rows
    }
}

pub fn placeholder_row(tab: Tab) -> Row {
    let first = NO_DATA.to_string();
    match tab {
        Tab::Commits => Row::Commit(CommitRow {
            sha: first,
            description: String::new(),
            author: String::new(),
            pushed_at: String::new(),
        }),
        Tab::Images => Row::Image(ImageRow {
            id: first,
            repository: String::new(),
            tag: String::new(),
            size: String::new(),
            created_at: String::new(),
        }),
        Tab::Workloads => Row::Workload(WorkloadRow {
            name: first,
            namespace: String::new(),
            status: String::new(),
            restarts: String::new(),
            age: String::new(),
            node: String::new(),
        }),
    }
}

pub fn commit_row(commit: &CommitRecord) -> CommitRow {
    let [sha, description, author, pushed_at] = COMMIT_COLUMNS.map(|column| column.width);
    let summary = commit.message.lines().next().unwrap_or_default();

    CommitRow {
        sha: truncate(&commit.sha, sha),
        description: truncate(or_not_available(summary), description),
        author: truncate(or_not_available_opt(commit.author.as_deref()), author),
        pushed_at: truncate(or_not_available_opt(commit.pushed_at.as_deref()), pushed_at),
    }
}

pub fn image_row(image: &ImageRecord) -> ImageRow {
    let [id, repository, tag, size, created_at] = IMAGE_COLUMNS.map(|column| column.width);
    let (repo_name, tag_name) = split_reference(image.pull_reference());

    ImageRow {
        id: truncate(or_not_available(&image.id), id),
        repository: truncate(&repo_name, repository),
        tag: truncate(&tag_name, tag),
        size: truncate(or_not_available(&image.size), size),
        created_at: truncate(or_not_available(&image.created_at), created_at),
    }
}

pub fn workload_row(workload: &WorkloadRecord) -> WorkloadRow {
    let [name, namespace, status, restarts, age, node] =
        WORKLOAD_COLUMNS.map(|column| column.width);

    WorkloadRow {
        name: truncate(or_not_available(&workload.name), name),
        namespace: truncate(or_not_available(&workload.namespace), namespace),
        status: truncate(or_not_available(&workload.status), status),
        restarts: truncate(or_not_available(&workload.restarts), restarts),
        age: truncate(or_not_available(&workload.age), age),
        node: truncate(or_not_available(&workload.node), node),
    }
}

/// Orders pod detail entries for display. A failed lookup still produces a
/// single error row so the detail table is never empty.
pub fn detail_rows(details: &Result<DetailMap, String>) -> Vec<DetailRow> {
    let value_width = DETAIL_COLUMNS[1].width;
    let key_width = DETAIL_COLUMNS[0].width;

    let details = match details {
        Ok(details) => details,
        Err(error) => {
            let detail = error.lines().next().unwrap_or_default().trim();
            let value = if detail.is_empty() {
                "Failed to load pod details".to_string()
            } else {
                format!("Failed to load pod details: {detail}")
            };
            return vec![DetailRow {
                key: "Error".to_string(),
                value: truncate(&value, value_width),
            }];
        }
    };

    let ordered = DETAIL_KEY_ORDER
        .iter()
        .filter_map(|key| details.get_key_value(*key));
    let remaining = details
        .iter()
        .filter(|(key, _)| !DETAIL_KEY_ORDER.contains(&key.as_str()));

    let rows = ordered
        .chain(remaining)
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| DetailRow {
            key: truncate(key, key_width),
            value: truncate(value, value_width),
        })
        .collect::<Vec<_>>();

    if rows.is_empty() {
        vec![DetailRow {
            key: "Error".to_string(),
            value: NO_DATA.to_string(),
        }]
    } else {
        rows
    }
}

/// Derives a Kubernetes-safe deployment name from an image reference.
pub fn workload_name(image: &str) -> String {
    let mut name = strip_registry_host(image.trim())
        .to_lowercase()
        .replace([':', '/', '_', '.'], "-")
        .trim_matches('-')
        .to_string();

    if name.is_empty() || name == "latest" {
        name = DEFAULT_WORKLOAD_NAME.to_string();
    }

    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        name = format!("{WORKLOAD_NAME_PREFIX}{name}");
    }

    if name.chars().count() > MAX_WORKLOAD_NAME_LEN {
        name = name.chars().take(MAX_WORKLOAD_NAME_LEN).collect();
    }
    name.trim_end_matches('-').to_string()
}

/// Drops a leading `host[:port]/` segment from an image reference.
pub fn strip_registry_host(reference: &str) -> &str {
    match reference.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            rest
        }
        _ => reference,
    }
}

/// Splits an image reference into repository and tag for display.
pub fn split_reference(reference: Option<&str>) -> (String, String) {
    let Some(reference) = reference else {
        return (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string());
    };

    let stripped = strip_registry_host(reference);
    match stripped.rfind(':') {
        Some(index) if index > 0 => (
            stripped[..index].to_string(),
            stripped[index + 1..].to_string(),
        ),
        _ => (stripped.to_string(), "latest".to_string()),
    }
}

fn or_not_available(value: &str) -> &str {
    if value.trim().is_empty() {
        NOT_AVAILABLE
    } else {
        value
    }
}

fn or_not_available_opt(value: Option<&str>) -> &str {
    or_not_available(value.unwrap_or_default())
}
