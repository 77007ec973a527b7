//! Community, membership and blog post rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::contains_ignore_case;

/// Table names used by the admin console.
pub const COMMUNITIES_TABLE: &str = "communities";
pub const COMMUNITY_MEMBERS_TABLE: &str = "community_members";
pub const BLOG_POSTS_TABLE: &str = "blog_posts";

/// Posts shown under recent activity on the dashboard.
pub const RECENT_POSTS_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub course_count: i64,
    #[serde(default)]
    pub group_count: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Community {
    pub fn status_label(&self) -> &'static str {
        if self.is_active {
            "Active"
        } else {
            "Inactive"
        }
    }

    /// Case-insensitive match on name or description. Empty terms match everything.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim();
        term.is_empty()
            || contains_ignore_case(&self.name, term)
            || self
                .description
                .as_deref()
                .map(|d| contains_ignore_case(d, term))
                .unwrap_or(false)
    }

    pub fn search<'a>(communities: &'a [Community], term: &str) -> Vec<&'a Community> {
        communities.iter().filter(|c| c.matches_search(term)).collect()
    }
}

/// Insert payload for `communities`; server fills ids, counts and timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct NewCommunity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub owner_id: String,
}

impl NewCommunity {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        let description = description.into();
        Self {
            name: name.into().trim().to_string(),
            description: Some(description.trim().to_string()).filter(|d| !d.is_empty()),
            category: None,
            image_url: None,
            owner_id: owner_id.into(),
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        let category = category.trim();
        self.category = (!category.is_empty()).then(|| category.to_string());
        self
    }

    /// Name and description are required.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.description.is_none() {
            return Err("Community name and description are required".to_string());
        }
        if self.owner_id.is_empty() {
            return Err("A signed-in owner is required".to_string());
        }
        Ok(())
    }
}

/// Partial update for `communities`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommunityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl CommunityUpdate {
    /// Flip the active flag of `community`.
    pub fn toggle_status(community: &Community) -> Self {
        Self {
            is_active: Some(!community.is_active),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    #[default]
    Member,
    Admin,
    Owner,
}

impl MemberRole {
    pub fn display_name(&self) -> &'static str {
        match self {
            MemberRole::Member => "Member",
            MemberRole::Admin => "Admin",
            MemberRole::Owner => "Owner",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityMember {
    pub id: String,
    pub community_id: String,
    pub user_id: String,
    #[serde(default)]
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            PostStatus::Draft => "Draft",
            PostStatus::Published => "Published",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub community_id: String,
    pub author_id: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Headline counts for the dashboard. `None` means the count could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub communities: Option<u64>,
    pub members: Option<u64>,
    pub posts: Option<u64>,
}

impl DashboardStats {
    /// Tables counted, in the order `from_counts` expects. Posts are read
    /// from `blog_posts`, the table the schema declares.
    pub const TABLES: [&'static str; 3] =
        [COMMUNITIES_TABLE, COMMUNITY_MEMBERS_TABLE, BLOG_POSTS_TABLE];

    pub fn from_counts(counts: &[Option<u64>]) -> Self {
        let at = |i: usize| counts.get(i).copied().flatten();
        Self {
            communities: at(0),
            members: at(1),
            posts: at(2),
        }
    }
}
