//! Skills loader — discovers, loads, and filters skill files.
//!
//! Port of nanobot's `agent/skills.py`.
//!
//! # Architecture
//!
//! Skills are **Markdown files** (`SKILL.md`) that teach the agent how to
//! combine existing tools for specific domains (GitHub, weather, tmux, etc.).
//! They do **not** register new tools.
//!
//! ## Two-tier loading
//!
//! 1. **Always-on skills** (`always: true` in metadata) — full content injected
//!    into every system prompt.
//! 2. **On-demand skills** — only an XML summary (name, description, path,
//!    availability) is injected. The LLM uses `read_file` to load the full
//!    `SKILL.md` when it decides a skill is relevant.
//!
//! ## Discovery order
//!
//! 1. `workspace/skills/<name>/SKILL.md` (user custom — highest priority)
//! 2. Built-in skills bundled with picoclaw (lower priority, overridden by name)
//!
//! ## SKILL.md format
//!
//! ```text
//! ---
//! name: github
//! description: "Interact with GitHub using the gh CLI"
//! metadata: {"nanobot":{"requires":{"bins":["gh"]},"always":false}}
//! ---
//!
//! # GitHub Skill
//!
//! Use the `exec` tool to run `gh` commands ...
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

// ─────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────

/// Where a skill was discovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkillSource {
    /// User's workspace `skills/` directory.
    Workspace,
    /// Built-in with picoclaw.
    Builtin,
}

/// Metadata about a discovered skill.
#[derive(Clone, Debug)]
pub struct SkillInfo {
    /// Skill name (directory name).
    pub name: String,
    /// Path to the `SKILL.md` file.
    pub path: PathBuf,
    /// Where the skill was found.
    pub source: SkillSource,
}

/// Parsed requirements for a skill.
#[derive(Clone, Debug, Default)]
pub struct SkillRequires {
    /// CLI binaries that must be on PATH.
    pub bins: Vec<String>,
    /// Environment variables that must be set.
    pub env: Vec<String>,
}

/// Parsed nanobot metadata block from the frontmatter `metadata` JSON field.
#[derive(Clone, Debug, Default)]
pub struct SkillMeta {
    /// If true, full content is always injected into the system prompt.
    pub always: bool,
    /// Requirements for this skill to be available.
    pub requires: SkillRequires,
    /// Description (from frontmatter top-level, not metadata JSON).
    pub description: Option<String>,
}

// ─────────────────────────────────────────────
// SkillsLoader
// ─────────────────────────────────────────────

/// Discovers and loads skill files from workspace and built-in directories.
pub struct SkillsLoader {
    /// User workspace root.
    workspace_skills: PathBuf,
    /// Built-in skills directory.
    builtin_skills: Option<PathBuf>,
}

impl SkillsLoader {
    /// Create a new skills loader.
    ///
    /// - `workspace` — the agent workspace root (contains `skills/` subdirectory)
    /// - `builtin_skills` — optional path to built-in skills directory
    pub fn new(workspace: &Path, builtin_skills: Option<PathBuf>) -> Self {
        Self {
            workspace_skills: workspace.join("skills"),
            builtin_skills,
        }
    }

    // ────────────── Discovery ──────────────

    /// List all discovered skills.
    ///
    /// If `filter_unavailable` is true, skills with unmet requirements
    /// (missing CLI binaries or env vars) are excluded.
    pub fn list_skills(&self, filter_unavailable: bool) -> Vec<SkillInfo> {
        let mut skills = Vec::new();

        // 1. Workspace skills (highest priority)
        if self.workspace_skills.is_dir() {
            scan_skill_dirs(&self.workspace_skills, SkillSource::Workspace, &mut skills);
        }

        // 2. Built-in skills (skip if name already found in workspace)
        if let Some(builtin) = &self.builtin_skills {
            if builtin.is_dir() {
                let existing: Vec<String> = skills.iter().map(|s| s.name.clone()).collect();
                let mut builtin_skills = Vec::new();
                scan_skill_dirs(builtin, SkillSource::Builtin, &mut builtin_skills);
                for skill in builtin_skills {
                    if !existing.contains(&skill.name) {
                        skills.push(skill);
                    }
                }
            }
        }

        if filter_unavailable {
            skills.retain(|s| {
                let meta = self.get_skill_meta(&s.name);
                check_requirements(&meta.requires)
            });
        }

        skills
    }

    // ────────────── Loading ──────────────

    /// Load the raw content of a skill by name.
    ///
    /// Looks in workspace first, then built-in.
    pub fn load_skill(&self, name: &str) -> Option<String> {
        let ws_path = self.workspace_skills.join(name).join("SKILL.md");
        if ws_path.is_file() {
            return std::fs::read_to_string(&ws_path).ok();
        }

        if let Some(builtin) = &self.builtin_skills {
            let bi_path = builtin.join(name).join("SKILL.md");
            if bi_path.is_file() {
                return std::fs::read_to_string(&bi_path).ok();
            }
        }

        None
    }

    /// Load full content of specific skills, stripped of frontmatter,
    /// for injection into the system prompt (always-on skills).
    pub fn load_skills_for_context(&self, names: &[String]) -> String {
        let parts: Vec<String> = names
            .iter()
            .filter_map(|name| {
                let content = self.load_skill(name)?;
                let body = strip_frontmatter(&content);
                if body.is_empty() {
                    return None;
                }
                Some(format!("### Skill: {name}\n\n{body}"))
            })
            .collect();

        parts.join("\n\n---\n\n")
    }

    /// Build an XML summary of all skills for the system prompt.
    ///
    /// The LLM uses this to decide which skills to load on demand via `read_file`.
    pub fn build_skills_summary(&self) -> String {
        let all = self.list_skills(false);
        if all.is_empty() {
            return String::new();
        }

        let mut lines = vec!["<skills>".to_string()];

        for skill in &all {
            let meta = self.get_skill_meta(&skill.name);
            let available = check_requirements(&meta.requires);
            let desc = meta
                .description
                .as_deref()
                .unwrap_or(&skill.name);

            lines.push(format!(
                "  <skill available=\"{}\">",
                if available { "true" } else { "false" }
            ));
            lines.push(format!("    <name>{}</name>", escape_xml(&skill.name)));
            lines.push(format!("    <description>{}</description>", escape_xml(desc)));
            lines.push(format!("    <location>{}</location>", skill.path.display()));

            if !available {
                let missing = get_missing_requirements(&meta.requires);
                if !missing.is_empty() {
                    lines.push(format!("    <requires>{}</requires>", escape_xml(&missing)));
                }
            }

            lines.push("  </skill>".to_string());
        }

        lines.push("</skills>".to_string());
        lines.join("\n")
    }

    /// Get names of skills that should always be injected (full body).
    pub fn get_always_skills(&self) -> Vec<String> {
        self.list_skills(true)
            .iter()
            .filter(|s| {
                let meta = self.get_skill_meta(&s.name);
                meta.always
            })
            .map(|s| s.name.clone())
            .collect()
    }

    // ────────────── Metadata ──────────────

    /// Parse frontmatter metadata for a skill.
    pub fn get_skill_meta(&self, name: &str) -> SkillMeta {
        let content = match self.load_skill(name) {
            Some(c) => c,
            None => return SkillMeta::default(),
        };

        let frontmatter = match parse_frontmatter(&content) {
            Some(fm) => fm,
            None => return SkillMeta::default(),
        };

        // Top-level description
        let description = frontmatter
            .iter()
            .find(|(k, _)| k == "description")
            .map(|(_, v)| v.trim_matches('"').trim_matches('\'').to_string());

        // Top-level `always`
        let always_top = frontmatter
            .iter()
            .find(|(k, _)| k == "always")
            .map(|(_, v)| v == "true")
            .unwrap_or(false);

        // Parse the `metadata` field (JSON string containing nanobot config)
        let metadata_json = frontmatter
            .iter()
            .find(|(k, _)| k == "metadata")
            .map(|(_, v)| v.as_str())
            .unwrap_or("");

        let (nanobot_always, requires) = parse_nanobot_metadata(metadata_json);

        SkillMeta {
            always: always_top || nanobot_always,
            requires,
            description,
        }
    }
}

// ─────────────────────────────────────────────
// Helper functions
// ─────────────────────────────────────────────

/// Scan a directory for skill subdirectories containing `SKILL.md`.
fn scan_skill_dirs(dir: &Path, source: SkillSource, out: &mut Vec<SkillInfo>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let skill_file = path.join("SKILL.md");
            if skill_file.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    debug!(name, source = ?source, "discovered skill");
                    out.push(SkillInfo {
                        name: name.to_string(),
                        path: skill_file,
                        source: source.clone(),
                    });
                }
            }
        }
    }
}

/// Parse YAML-like frontmatter (between `---` delimiters) into key-value pairs.
///
/// Uses naive line-by-line parsing (matching nanobot's approach).
fn parse_frontmatter(content: &str) -> Option<Vec<(String, String)>> {
    if !content.starts_with("---") {
        return None;
    }

    let after_first = &content[3..];
    let end = after_first.find("\n---")?;
    let block = &after_first[..end];

    let mut pairs = Vec::new();
    for line in block.lines() {
        let line = line.trim();
        if let Some(idx) = line.find(':') {
            let key = line[..idx].trim().to_string();
            let value = line[idx + 1..].trim().to_string();
            if !key.is_empty() {
                pairs.push((key, value));
            }
        }
    }

    Some(pairs)
}

/// Parse the `metadata` JSON field for nanobot-specific config.
///
/// Expected format: `{"nanobot":{"always":true,"requires":{"bins":["gh"],"env":["TOKEN"]}}}`
fn parse_nanobot_metadata(raw: &str) -> (bool, SkillRequires) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return (false, SkillRequires::default()),
    };

    let nanobot = match value.get("nanobot") {
        Some(n) => n,
        None => return (false, SkillRequires::default()),
    };

    let always = nanobot
        .get("always")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let requires = match nanobot.get("requires") {
        Some(r) => {
            let bins = r
                .get("bins")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let env = r
                .get("env")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            SkillRequires { bins, env }
        }
        None => SkillRequires::default(),
    };

    (always, requires)
}

/// Strip YAML frontmatter from markdown content.
fn strip_frontmatter(content: &str) -> &str {
    if !content.starts_with("---") {
        return content;
    }
    let after_first = &content[3..];
    match after_first.find("\n---") {
        Some(end) => {
            let rest = &after_first[end + 4..]; // skip "\n---"
            rest.trim_start_matches('\n')
        }
        None => content,
    }
}

/// Escape XML special characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Check if all requirements are met.
fn check_requirements(requires: &SkillRequires) -> bool {
    for bin in &requires.bins {
        if !is_binary_available(bin) {
            return false;
        }
    }
    for env_var in &requires.env {
        if std::env::var(env_var).is_err() {
            return false;
        }
    }
    true
}

/// Get a human-readable list of missing requirements.
fn get_missing_requirements(requires: &SkillRequires) -> String {
    let mut missing = Vec::new();

    for bin in &requires.bins {
        if !is_binary_available(bin) {
            missing.push(format!("CLI: {bin}"));
        }
    }
    for env_var in &requires.env {
        if std::env::var(env_var).is_err() {
            missing.push(format!("ENV: {env_var}"));
        }
    }

    missing.join(", ")
}

/// Check if a binary is available on the system PATH.
fn is_binary_available(name: &str) -> bool {
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return true;
            }
        }
    }
    false
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────


