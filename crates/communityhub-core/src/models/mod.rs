//! Data models for communityhub entities.
//!
//! This module contains the data structures used by the admin console:
//!
//! - `Session`, `Profile`: the authenticated principal and its profile row
//! - `Community`, `CommunityMember`, `BlogPost`: community content
//! - `Reseller`: affiliate network rows, with list filtering and totals

pub mod account;
pub mod community;
pub mod reseller;

pub use account::{Profile, Session, ADMIN_ROLE};
pub use community::{
    BlogPost, Community, CommunityMember, CommunityUpdate, DashboardStats, MemberRole, NewCommunity,
    PostStatus, BLOG_POSTS_TABLE, COMMUNITIES_TABLE, COMMUNITY_MEMBERS_TABLE, RECENT_POSTS_LIMIT,
};
pub use reseller::{
    NewReseller, Reseller, ResellerFilter, ResellerStatus, ResellerSummary, RESELLERS_TABLE,
};
