//! Application state for the communityhub console.
//!
//! The `App` struct wires the data client, the auth controller and the
//! session bridge together, and dispatches console commands. Pages read the
//! auth state to decide what to show; they never write it.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use communityhub_core::api::{AutoRefresh, Query, RestClient};
use communityhub_core::auth::{AuthController, AuthError, PrivilegedPrincipal, SessionBridge};
use communityhub_core::config::Config;
use communityhub_core::models::{
    BlogPost, Community, CommunityMember, CommunityUpdate, DashboardStats, NewCommunity,
    NewReseller, Reseller, ResellerFilter, ResellerStatus, ResellerSummary, BLOG_POSTS_TABLE,
    COMMUNITIES_TABLE, COMMUNITY_MEMBERS_TABLE, RECENT_POSTS_LIMIT, RESELLERS_TABLE,
};
use communityhub_core::utils::{
    format_currency, format_date, format_phone, format_time_ago, truncate,
};

// ============================================================================
// Constants
// ============================================================================

/// Maximum length for the sign-in identifier (an email address).
const MAX_IDENTIFIER_LENGTH: usize = 254;

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

/// How often the background task re-validates the remote session.
const SESSION_CHECK_INTERVAL_SECS: u64 = 60;

/// Column width for names in list output.
const NAME_COLUMN_WIDTH: usize = 28;

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login(Option<String>),
    Logout,
    WhoAmI,
    Dashboard,
    Communities(String),
    CreateCommunity,
    ToggleCommunity(String),
    Members(String),
    Resellers {
        search: String,
        status: Option<ResellerStatus>,
    },
    AddReseller,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(String::new());
        };
        let rest: Vec<&str> = words.collect();

        match name.to_lowercase().as_str() {
            "login" | "signin" => Ok(Command::Login(rest.first().map(|s| s.to_string()))),
            "logout" | "signout" => Ok(Command::Logout),
            "whoami" | "status" => Ok(Command::WhoAmI),
            "dashboard" => Ok(Command::Dashboard),
            "communities" => Ok(Command::Communities(rest.join(" "))),
            "create-community" => Ok(Command::CreateCommunity),
            "toggle-community" => rest
                .first()
                .map(|id| Command::ToggleCommunity(id.to_string()))
                .ok_or_else(|| "Usage: toggle-community <community-id>".to_string()),
            "members" => rest
                .first()
                .map(|id| Command::Members(id.to_string()))
                .ok_or_else(|| "Usage: members <community-id>".to_string()),
            "resellers" => Self::parse_resellers(&rest),
            "add-reseller" => Ok(Command::AddReseller),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("Unknown command '{}'. Type 'help' for a list.", other)),
        }
    }

    /// `resellers [search words...] [--status active|pending|inactive|all]`
    fn parse_resellers(args: &[&str]) -> Result<Self, String> {
        let mut search = Vec::new();
        let mut status = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if *arg == "--status" {
                let value = iter
                    .next()
                    .ok_or_else(|| "--status needs a value".to_string())?;
                status = match *value {
                    "all" => None,
                    v => Some(v.parse::<ResellerStatus>()?),
                };
            } else {
                search.push(*arg);
            }
        }
        Ok(Command::Resellers {
            search: search.join(" "),
            status,
        })
    }
}

const HELP_TEXT: &str = "\
Commands:
  login [email]            Sign in
  logout                   Sign out
  whoami                   Show the signed-in account
  dashboard                Counts and recent posts
  communities [search]     List communities, optionally matching name/description
  create-community         Create a community owned by you
  toggle-community <id>    Activate or deactivate a community
  members <community-id>   List members of a community
  resellers [search] [--status active|pending|inactive|all]
                           List resellers
  add-reseller             Create a reseller
  help                     Show this help
  quit                     Exit";

// ============================================================================
// Input validation
// ============================================================================

/// Check sign-in input before it leaves the process.
pub fn validate_credentials(identifier: &str, secret: &str) -> Result<(), String> {
    if identifier.is_empty() || secret.is_empty() {
        return Err("Email and password required".to_string());
    }
    if identifier.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err("Email is too long".to_string());
    }
    if secret.chars().count() > MAX_PASSWORD_LENGTH {
        return Err("Password is too long".to_string());
    }
    if identifier.chars().any(char::is_control) || secret.chars().any(char::is_control) {
        return Err("Control characters are not allowed".to_string());
    }
    Ok(())
}

/// One dashboard activity row for a post.
pub fn activity_line(post: &BlogPost, now: chrono::DateTime<Utc>) -> String {
    format!(
        "{} [{}] {}",
        truncate(&post.title, NAME_COLUMN_WIDTH * 2),
        post.status.display_name(),
        format_time_ago(&post.created_at, now)
    )
}

/// Message shown under the sign-in prompt.
pub fn sign_in_message(err: &AuthError) -> String {
    match err {
        AuthError::MissingCredentials => "Email and password required".to_string(),
        AuthError::InvalidCredentials(msg) => msg.clone(),
        AuthError::RemoteUnavailable(_) => {
            "Unable to connect to server. Check your internet connection.".to_string()
        }
        AuthError::Timeout => "Connection timed out. Please try again.".to_string(),
    }
}

// ============================================================================
// Main Application Struct
// ============================================================================

pub struct App {
    pub config: Config,
    client: RestClient,
    auth: Arc<AuthController>,
    bridge: Option<SessionBridge>,
    _auto_refresh: AutoRefresh,
}

impl App {
    /// Create the application and run the initial session check
    pub async fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(service_url = ?config.service_url, "Config loaded");

        let client = RestClient::from_config(&config)?;

        let principal = PrivilegedPrincipal::from_config(&config, |key| std::env::var(key).ok());
        debug!(privileged = principal.is_some(), "Privileged principal resolved");

        let auth = Arc::new(AuthController::new(
            Arc::new(client.clone()),
            principal,
            config.request_timeout(),
        ));
        let bridge = SessionBridge::start(auth.clone()).await;
        let auto_refresh =
            client.start_auto_refresh(Duration::from_secs(SESSION_CHECK_INTERVAL_SECS));

        Ok(Self {
            config,
            client,
            auth,
            bridge: Some(bridge),
            _auto_refresh: auto_refresh,
        })
    }

    /// Read and dispatch commands until `quit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        println!("CommunityHub admin console. Type 'help' for commands.");
        if let Some(ref session) = self.auth.state().session {
            println!("Signed in as {}", session.email);
        }

        loop {
            let Some(line) = Self::prompt("> ")? else {
                return Ok(());
            };
            let command = match Command::parse(&line) {
                Ok(command) => command,
                Err(msg) => {
                    if !msg.is_empty() {
                        println!("{}", msg);
                    }
                    continue;
                }
            };
            if command == Command::Quit {
                return Ok(());
            }
            self.dispatch(command).await?;
        }
    }

    /// Stop background work; the session listener is released here
    pub async fn shutdown(mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.shutdown().await;
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login(identifier) => self.login(identifier).await?,
            Command::Logout => self.logout().await,
            Command::WhoAmI => self.who_am_i(),
            Command::Help => println!("{}", HELP_TEXT),
            Command::Quit => {}
            page => {
                if !self.require_session() {
                    return Ok(());
                }
                match page {
                    Command::Dashboard => self.show_dashboard().await,
                    Command::Communities(search) => self.list_communities(&search).await,
                    Command::CreateCommunity => self.create_community().await?,
                    Command::ToggleCommunity(id) => self.toggle_community(&id).await,
                    Command::Members(id) => self.list_members(&id).await,
                    Command::Resellers { search, status } => {
                        self.list_resellers(ResellerFilter { search, status }).await
                    }
                    Command::AddReseller => self.add_reseller().await?,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    fn require_session(&self) -> bool {
        let state = self.auth.state();
        if state.loading {
            println!("Checking session, please wait...");
            return false;
        }
        if !state.is_authenticated() {
            println!("Please sign in first (login).");
            return false;
        }
        true
    }

    async fn login(&mut self, identifier: Option<String>) -> Result<()> {
        if self.auth.state().is_authenticated() {
            println!("Already signed in. Use 'logout' first.");
            return Ok(());
        }

        let identifier = match identifier {
            Some(id) => id,
            None => {
                let label = match self.config.last_identifier {
                    Some(ref last) => format!("Email [{}]: ", last),
                    None => "Email: ".to_string(),
                };
                let input = Self::prompt(&label)?.unwrap_or_default();
                if input.is_empty() {
                    self.config.last_identifier.clone().unwrap_or_default()
                } else {
                    input
                }
            }
        };
        let secret = rpassword::prompt_password("Password: ")?;

        if let Err(msg) = validate_credentials(&identifier, &secret) {
            println!("{}", msg);
            return Ok(());
        }

        println!("Signing in...");
        match self.auth.sign_in(&identifier, &secret).await {
            Ok(session) => {
                self.config.last_identifier = Some(identifier);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                let state = self.auth.state();
                let name = state
                    .profile
                    .as_ref()
                    .map(|p| p.display_name().to_string())
                    .unwrap_or_else(|| session.email.clone());
                info!("Login successful");
                println!("Welcome, {}!", name);
            }
            Err(e) => println!("{}", sign_in_message(&e)),
        }
        Ok(())
    }

    async fn logout(&mut self) {
        if let Err(e) = self.auth.sign_out().await {
            debug!(error = %e, "Remote sign-out reported an error");
        }
        println!("Signed out.");
    }

    fn who_am_i(&self) {
        let state = self.auth.state();
        match (state.session, state.profile) {
            (Some(session), profile) => {
                println!("Email:   {}", session.email);
                println!("Role:    {}", session.role);
                println!("Since:   {}", format_date(Some(&session.created_at)));
                if let Some(profile) = profile {
                    println!("Name:    {}", profile.display_name());
                    if let Some(role) = profile.role {
                        println!("Profile: {}", role);
                    }
                }
            }
            (None, _) if state.loading => println!("Checking session..."),
            (None, _) => println!("Not signed in."),
        }
    }

    // =========================================================================
    // Pages
    // =========================================================================

    async fn show_dashboard(&self) {
        let counts: Vec<Option<u64>> = self
            .client
            .count_all(&DashboardStats::TABLES)
            .await
            .into_iter()
            .map(|r| {
                r.map_err(|e| warn!(error = %e, "Failed to count rows"))
                    .ok()
            })
            .collect();
        let stats = DashboardStats::from_counts(&counts);
        let show = |n: Option<u64>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());

        println!("Communities: {}", show(stats.communities));
        println!("Members:     {}", show(stats.members));
        println!("Posts:       {}", show(stats.posts));

        let query = Query::new()
            .order("created_at", false)
            .limit(RECENT_POSTS_LIMIT);
        match self.client.select::<BlogPost>(BLOG_POSTS_TABLE, &query).await {
            Ok(posts) if posts.is_empty() => println!("\nNo recent activity."),
            Ok(posts) => {
                println!("\nRecent activity:");
                let now = Utc::now();
                for post in &posts {
                    println!("  {}", activity_line(post, now));
                }
            }
            Err(e) => warn!(error = %e, "Error fetching recent posts"),
        }
    }

    async fn list_communities(&self, search: &str) {
        let query = Query::new().order("created_at", false);
        match self.client.select::<Community>(COMMUNITIES_TABLE, &query).await {
            Ok(communities) if communities.is_empty() => println!("No communities yet."),
            Ok(communities) => {
                let matching = Community::search(&communities, search);
                if matching.is_empty() {
                    println!("No communities match '{}'.", search);
                }
                for c in matching {
                    println!(
                        "{:<36}  {:<width$}  {:>6} members  {:<8}  {}",
                        c.id,
                        truncate(&c.name, NAME_COLUMN_WIDTH),
                        c.member_count,
                        c.status_label(),
                        format_date(Some(&c.created_at)),
                        width = NAME_COLUMN_WIDTH,
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Error fetching communities");
                println!("Error fetching communities: {}", e);
            }
        }
    }

    async fn create_community(&self) -> Result<()> {
        let Some(owner_id) = self.auth.state().session.map(|s| s.id) else {
            println!("Please sign in first (login).");
            return Ok(());
        };
        let name = Self::prompt("Community name: ")?.unwrap_or_default();
        let description = Self::prompt("Description: ")?.unwrap_or_default();
        let category = Self::prompt("Category: ")?.unwrap_or_default();
        let new = NewCommunity::new(name, description, owner_id).with_category(&category);

        if let Err(msg) = new.validate() {
            println!("{}", msg);
            return Ok(());
        }

        match self
            .client
            .insert::<_, Community>(COMMUNITIES_TABLE, &[new])
            .await
        {
            Ok(created) => match created.first() {
                Some(c) => println!("Created {} ({}).", c.name, c.id),
                None => println!("Created."),
            },
            Err(e) => {
                warn!(error = %e, "Error creating community");
                println!("Error creating community: {}", e);
            }
        }
        Ok(())
    }

    async fn toggle_community(&self, community_id: &str) {
        let current = match self
            .client
            .select_one::<Community>(COMMUNITIES_TABLE, "id", community_id)
            .await
        {
            Ok(c) => c,
            Err(e) if e.is_row_not_found() => {
                println!("No community with id {}.", community_id);
                return;
            }
            Err(e) => {
                warn!(error = %e, "Error fetching community");
                println!("Error fetching community: {}", e);
                return;
            }
        };

        let patch = CommunityUpdate::toggle_status(&current);
        match self
            .client
            .update::<_, Community>(COMMUNITIES_TABLE, "id", community_id, &patch)
            .await
        {
            Ok(updated) => {
                let label = updated
                    .first()
                    .map(|c| c.status_label())
                    .unwrap_or("updated");
                println!("{} is now {}.", current.name, label);
            }
            Err(e) => {
                warn!(error = %e, "Error updating community");
                println!("Error updating community: {}", e);
            }
        }
    }

    async fn list_members(&self, community_id: &str) {
        let query = Query::new()
            .eq("community_id", community_id)
            .order("joined_at", true);
        match self
            .client
            .select::<CommunityMember>(COMMUNITY_MEMBERS_TABLE, &query)
            .await
        {
            Ok(members) if members.is_empty() => println!("No members."),
            Ok(members) => {
                for m in &members {
                    println!(
                        "{:<36}  {:<7}  joined {}",
                        m.user_id,
                        m.role.display_name(),
                        format_date(Some(&m.joined_at))
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Error fetching members");
                println!("Error fetching members: {}", e);
            }
        }
    }

    async fn list_resellers(&self, filter: ResellerFilter) {
        let query = Query::new().order("created_at", false);
        let resellers = match self.client.select::<Reseller>(RESELLERS_TABLE, &query).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Error fetching resellers");
                println!("Error fetching resellers: {}", e);
                return;
            }
        };

        let summary = ResellerSummary::from_resellers(&resellers);
        println!(
            "{} resellers ({} active), sales {}, commissions {}",
            summary.total,
            summary.active,
            format_currency(summary.total_sales),
            format_currency(summary.total_commissions)
        );

        for r in filter.apply(&resellers) {
            println!(
                "{:<width$}  {:<30}  {:<16}  {:<8}  {:>5.1}%  {:>12}  last sale {}",
                truncate(&r.name, NAME_COLUMN_WIDTH),
                truncate(&r.email, 30),
                r.phone.as_deref().map(format_phone).unwrap_or_default(),
                r.status.display_name(),
                r.commission_rate,
                format_currency(r.total_sales),
                format_date(r.last_sale.as_ref()),
                width = NAME_COLUMN_WIDTH,
            );
        }
    }

    async fn add_reseller(&self) -> Result<()> {
        let name = Self::prompt("Name: ")?.unwrap_or_default();
        let email = Self::prompt("Email: ")?.unwrap_or_default();
        let mut new = NewReseller::new(name, email);
        new.phone = Self::prompt("Phone: ")?.unwrap_or_default();
        new.company = Self::prompt("Company: ")?.unwrap_or_default();
        if let Some(rate) = Self::prompt("Commission % [10]: ")?.filter(|s| !s.is_empty()) {
            match rate.parse::<f64>() {
                Ok(rate) => new.commission_rate = rate,
                Err(_) => {
                    println!("Commission must be a number");
                    return Ok(());
                }
            }
        }

        if let Err(msg) = new.validate() {
            println!("{}", msg);
            return Ok(());
        }

        match self
            .client
            .insert::<_, Reseller>(RESELLERS_TABLE, &[new])
            .await
        {
            Ok(created) => {
                let name = created.first().map(|r| r.name.as_str()).unwrap_or("reseller");
                println!("Created {}.", name);
            }
            Err(e) => {
                warn!(error = %e, "Error creating reseller");
                println!("Error creating reseller: {}", e);
            }
        }
        Ok(())
    }

    /// Print a prompt and read one trimmed line. `None` at end of input.
    fn prompt(label: &str) -> Result<Option<String>> {
        print!("{}", label);
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }
}
