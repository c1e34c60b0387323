//! GitHub API Example
//!
//! Demonstrates skein's composable client descriptors: a shared base
//! client, derived per endpoint, with middleware for retry and timeouts.

// Example-specific lint allowances
#![allow(missing_docs)]
#![allow(clippy::print_stdout)]
#![allow(dead_code)]

use std::time::Duration;

use skein::prelude::*;

// ============================================================================
// Data Types
// ============================================================================

/// A GitHub contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub login: String,
    pub contributions: u32,
}

/// A GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub stargazers_count: u32,
    pub forks_count: u32,
}

/// Request to create a GitHub issue.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIssue {
    pub title: String,
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// A GitHub issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u32,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
}

/// Filters for listing issues.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

// ============================================================================
// API built from client descriptors
// ============================================================================

/// GitHub API client.
///
/// Every endpoint derives a new [`Client`] from `base`; the base is never
/// changed.
#[derive(Debug, Clone)]
pub struct GitHubApi {
    base: Client,
}

impl GitHubApi {
    /// Client on `base_url` with JSON defaults, retries and a timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base = Client::new(base_url)
            .header("accept", "application/json")
            .header("user-agent", "skein-github-example/0.1.0")
            .retry_limit(3)
            .timeout(Duration::from_secs(30))
            .log_level(LogLevel::Info);
        Self { base }
    }

    /// Same API authenticated with a personal access token.
    #[must_use]
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            base: self.base.bearer_auth(token),
        }
    }

    fn repo(&self, owner: &str, repo: &str) -> Client {
        self.base.path("repos").path(owner).path(repo)
    }

    /// List contributors for a repository.
    pub async fn contributors(&self, owner: &str, repo: &str) -> Result<Vec<Contributor>> {
        self.repo(owner, repo).path("contributors").json().await
    }

    /// Get repository information.
    pub async fn get_repo(&self, owner: &str, repo: &str) -> Result<Repository> {
        self.repo(owner, repo).json().await
    }

    /// Create an issue.
    pub async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &CreateIssue,
    ) -> Result<Issue> {
        self.repo(owner, repo)
            .path("issues")
            .post()
            .body_from(issue)
            .json()
            .await
    }

    /// List issues matching `filter`.
    pub async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        filter: &IssueFilter,
    ) -> Result<Vec<Issue>> {
        self.repo(owner, repo)
            .path("issues")
            .query_from(filter)
            .json()
            .await
    }

    /// `OPTIONS` on a repository, keeping only the status.
    pub async fn repo_options(&self, owner: &str, repo: &str) -> Result<u16> {
        let response = self.repo(owner, repo).options().send().await?;
        Ok(response.status())
    }
}

impl Default for GitHubApi {
    fn default() -> Self {
        Self::new("https://api.github.com")
    }
}

// ============================================================================
// Main: Demonstrate usage
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let github = GitHubApi::default();
    let request = github.repo("rust-lang", "rust").path("contributors").build()?;

    println!("GitHub API Client created!");
    println!("Request: {} {}", request.method(), request.url());

    // Mocked calls never reach the network
    let mocked = GitHubApi {
        base: github.base.mock(vec![Contributor {
            login: "octocat".to_string(),
            contributions: 7,
        }]),
    };
    let contributors = mocked.contributors("rust-lang", "rust").await?;
    println!("Mocked contributors: {contributors:?}");

    println!("\n=== Example API calls (would require network access) ===");
    println!("github.contributors(\"rust-lang\", \"rust\").await?");
    println!("github.get_repo(\"rust-lang\", \"rust\").await?");
    println!("github.list_issues(\"rust-lang\", \"rust\", &IssueFilter::default()).await?");

    Ok(())
}

// ============================================================================
// Tests using wiremock
// ============================================================================
