//! Student progression feed and group clustering.
//!
//! The feed is read fresh on every call. Nothing here caches or retries; a
//! failed fetch propagates to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const PAGE_SIZE: usize = 100;
/// Safety cap for the read-all-students pagination loop.
const MAX_PAGES: usize = 50;
const FINISHED: &str = "finished";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(String),

    #[error("feed returned {0}: {1}")]
    Status(u16, String),

    #[error("could not parse feed response: {0}")]
    Parse(String),

    #[error("invalid feed url: {0}")]
    InvalidUrl(String),

    #[error("no progression feed configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub login: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub projects: Vec<ProjectProgress>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgress {
    #[serde(rename = "name")]
    pub project: String,
    pub group_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub login: String,
    pub display_name: String,
}

/// Students sharing a group identifier on one project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectGroup {
    pub project: String,
    pub group_id: String,
    pub status: String,
    pub members: Vec<GroupMember>,
}

impl ProjectGroup {
    pub fn is_finished(&self) -> bool {
        self.status == FINISHED
    }

    pub fn has_member(&self, login: &str) -> bool {
        self.members
            .iter()
            .any(|member| member.login.eq_ignore_ascii_case(login))
    }
}

#[async_trait]
pub trait ProgressionFeed: Send + Sync {
    async fn fetch_progress(&self, promotion_id: &str) -> Result<Vec<StudentProgress>, FeedError>;
}

/// Clusters the students who attempted `project` by their group identifier.
///
/// Groups keep the order in which they first appear in the feed.
pub fn group_by_project(entries: &[StudentProgress], project: &str) -> Vec<ProjectGroup> {
    let mut groups: Vec<ProjectGroup> = Vec::new();

    for student in entries {
        for entry in student.projects.iter().filter(|p| p.project == project) {
            let member = GroupMember {
                login: student.login.clone(),
                display_name: display_name(student),
            };

            match groups.iter_mut().find(|g| g.group_id == entry.group_id) {
                Some(group) => {
                    if !group.has_member(&member.login) {
                        group.members.push(member);
                    }
                }
                None => groups.push(ProjectGroup {
                    project: project.to_string(),
                    group_id: entry.group_id.clone(),
                    status: entry.status.clone(),
                    members: vec![member],
                }),
            }
        }
    }

    groups
}

pub fn find_group(entries: &[StudentProgress], project: &str, group_id: &str) -> Option<ProjectGroup> {
    group_by_project(entries, project)
        .into_iter()
        .find(|group| group.group_id == group_id)
}

fn display_name(student: &StudentProgress) -> String {
    let full = format!("{} {}", student.first_name, student.last_name);
    let full = full.trim();
    if full.is_empty() {
        student.login.clone()
    } else {
        full.to_string()
    }
}

/// Progression feed served over HTTP by the Zone01 platform.
pub struct HttpProgressionFeed {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpProgressionFeed {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Endpoint for one promotion. The id is percent-encoded as a single
    /// path segment.
    fn progress_url(&self, promotion_id: &str) -> Result<reqwest::Url, FeedError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| FeedError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| FeedError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["promotions", promotion_id, "progress"]);
        Ok(url)
    }

    async fn fetch_page(
        &self,
        promotion_id: &str,
        offset: usize,
    ) -> Result<Vec<StudentProgress>, FeedError> {
        let url = self.progress_url(promotion_id)?;
        let mut request = self
            .client
            .get(url)
            .query(&[("offset", offset), ("limit", PAGE_SIZE)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status(status.as_u16(), body));
        }

        response
            .json::<Vec<StudentProgress>>()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ProgressionFeed for HttpProgressionFeed {
    async fn fetch_progress(&self, promotion_id: &str) -> Result<Vec<StudentProgress>, FeedError> {
        let mut students = Vec::new();

        for page in 0..MAX_PAGES {
            let batch = self.fetch_page(promotion_id, page * PAGE_SIZE).await?;
            let last = batch.len() < PAGE_SIZE;
            students.extend(batch);
            if last {
                debug!(promotion_id, pages = page + 1, students = students.len(), "progression fetched");
                return Ok(students);
            }
        }

        warn!(
            promotion_id,
            students = students.len(),
            "progression feed hit the page cap, results may be truncated"
        );
        Ok(students)
    }
}

/// Stand-in used when no feed URL is configured.
pub struct UnconfiguredFeed;

#[async_trait]
impl ProgressionFeed for UnconfiguredFeed {
    async fn fetch_progress(&self, _promotion_id: &str) -> Result<Vec<StudentProgress>, FeedError> {
        Err(FeedError::NotConfigured)
    }
}
