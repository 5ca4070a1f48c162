use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;

use syspace_core::SyspaceConfig;
use syspace_runtime::migrations::{
    load_scripts_from_dir, verify_graph, MigrationEngine, MigrationReport, NewRevision,
    OfflineBackend, PgBackend, RevisionGraph, RevisionId, ScriptGenerator, Target, VersionMarker,
};

use crate::scripts::ScriptSource;

const DEFAULT_SCRIPT_DIR: &str = "migrations/versions";

/// Manage database migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub action: MigrateAction,

    /// Configuration file path.
    #[arg(short, long, default_value = "syspace.toml", global = true)]
    pub config: String,

    /// Revision script directory; overrides `migrations.script_location`.
    #[arg(short, long, global = true)]
    pub scripts: Option<PathBuf>,

    /// Database URL; overrides the configuration file and DATABASE_URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Upgrade to a later revision.
    Upgrade {
        /// `head`, `heads`, a revision id or prefix, a branch label, `label@head` or `+N`.
        #[arg(default_value = "head", allow_hyphen_values = true)]
        target: String,

        /// Print the SQL instead of running it.
        #[arg(long)]
        sql: bool,

        /// Revision the printed SQL starts from (with --sql).
        #[arg(long, requires = "sql")]
        from: Option<String>,
    },

    /// Revert to an earlier revision.
    Downgrade {
        /// `base`, a revision id or prefix, a branch label or `-N`.
        #[arg(allow_hyphen_values = true)]
        target: String,

        /// Print the SQL instead of running it.
        #[arg(long)]
        sql: bool,

        /// Revision the printed SQL starts from (required with --sql).
        #[arg(long, requires = "sql")]
        from: Option<String>,
    },

    /// Show the revision recorded in the database.
    Current,

    /// List revisions, newest first.
    History {
        /// Print as JSON, parent before child.
        #[arg(long)]
        json: bool,
    },

    /// Show the current head revisions.
    Heads,

    /// Show revisions with more than one child.
    Branches,

    /// Record a revision as applied without running any steps.
    Stamp {
        #[arg(allow_hyphen_values = true)]
        target: String,
    },

    /// Check that every downgrade reverses its upgrade.
    Check,

    /// Create a new revision script.
    Revision {
        /// Revision message.
        #[arg(short, long)]
        message: String,

        /// Parent revision (defaults to the single current head).
        #[arg(long)]
        head: Option<String>,

        /// Branch label for the new revision.
        #[arg(long)]
        branch_label: Vec<String>,

        /// Additional revision that must be applied first.
        #[arg(long)]
        depends_on: Vec<String>,
    },

    /// Create a revision joining several heads.
    Merge {
        /// Revision message.
        #[arg(short, long)]
        message: String,

        /// Revisions to join (defaults to all heads).
        revisions: Vec<String>,
    },
}

impl MigrateCommand {
    pub async fn execute(self) -> Result<()> {
        // Load .env if present
        dotenvy::dotenv().ok();

        let config = self.load_config()?;

        match &self.action {
            MigrateAction::Upgrade { target, sql, from } => {
                let graph = self.load_graph(&config)?;
                if *sql {
                    let start = resolve_start(&graph, from.as_deref())?;
                    let mut engine = offline_engine(&config, graph, start);
                    engine.upgrade(target).await?;
                    print!("{}", engine.into_backend().to_script());
                    return Ok(());
                }

                print_banner("Upgrade");
                let mut engine = connect(&config, graph).await?;
                let report = engine.upgrade(target).await?;
                print_report(&report);
            }

            MigrateAction::Downgrade { target, sql, from } => {
                let graph = self.load_graph(&config)?;
                if *sql {
                    let Some(from) = from.as_deref() else {
                        bail!("--sql downgrades need --from <revision> to know where to start");
                    };
                    let start = resolve_start(&graph, Some(from))?;
                    let mut engine = offline_engine(&config, graph, start);
                    engine.downgrade(target).await?;
                    print!("{}", engine.into_backend().to_script());
                    return Ok(());
                }

                print_banner("Downgrade");
                let mut engine = connect(&config, graph).await?;
                let report = engine.downgrade(target).await?;
                print_report(&report);
            }

            MigrateAction::Current => {
                let graph = self.load_graph(&config)?;
                let mut engine = connect(&config, graph).await?;
                let marker = engine.current().await?;

                println!();
                match &marker {
                    VersionMarker::Unversioned => {
                        println!("  {} Database is unversioned", style("ℹ").blue());
                    }
                    VersionMarker::Heads(heads) if heads.is_empty() => {
                        println!("  {} Database is at base", style("ℹ").blue());
                    }
                    VersionMarker::Heads(heads) => {
                        let graph_heads = engine.heads();
                        for id in heads {
                            let message = engine
                                .graph()
                                .get(id.as_str())
                                .map(|s| s.revision.message.as_str())
                                .unwrap_or("<unknown revision>");
                            let head = if graph_heads.contains(id) { " (head)" } else { "" };
                            println!(
                                "  {} {}{} {}",
                                style("✓").green(),
                                style(id).cyan(),
                                head,
                                style(message).dim()
                            );
                        }
                    }
                }
                println!();
            }

            MigrateAction::History { json } => {
                let graph = self.load_graph(&config)?;
                if *json {
                    let revisions: Vec<_> = graph.history().collect();
                    println!("{}", serde_json::to_string_pretty(&revisions)?);
                    return Ok(());
                }

                let heads = graph.heads();
                let branch_points = graph.branch_points();
                println!();
                for revision in graph.history().rev() {
                    let mut tags = Vec::new();
                    if heads.contains(&revision.id) {
                        tags.push("head");
                    }
                    if branch_points.contains(&revision.id) {
                        tags.push("branchpoint");
                    }
                    if revision.is_merge_point() {
                        tags.push("mergepoint");
                    }
                    let tags = if tags.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", tags.join(", "))
                    };
                    println!("  {}{}", revision, style(tags).yellow());
                }
                println!();
            }

            MigrateAction::Heads => {
                let graph = self.load_graph(&config)?;
                println!();
                for id in graph.heads() {
                    let labels = graph
                        .get(id.as_str())
                        .map(|s| s.revision.branch_labels.join(", "))
                        .unwrap_or_default();
                    if labels.is_empty() {
                        println!("  {} {}", style("→").dim(), style(&id).cyan());
                    } else {
                        println!("  {} {} ({})", style("→").dim(), style(&id).cyan(), labels);
                    }
                }
                println!();
            }

            MigrateAction::Branches => {
                let graph = self.load_graph(&config)?;
                let branch_points = graph.branch_points();
                println!();
                if branch_points.is_empty() {
                    println!("  {} No branch points", style("ℹ").blue());
                }
                for id in branch_points {
                    println!("  {}", style(&id).cyan());
                    for child in graph.children_of(id.as_str()) {
                        println!("    {} {}", style("→").dim(), child);
                    }
                }
                println!();
            }

            MigrateAction::Stamp { target } => {
                let graph = self.load_graph(&config)?;
                let mut engine = connect(&config, graph).await?;
                let marker = engine.stamp(target).await?;
                println!("  {} Stamped {}", style("✓").green(), marker);
            }

            MigrateAction::Check => {
                let graph = self.load_graph(&config)?;
                let report = verify_graph(&graph);

                println!();
                for id in &report.opaque {
                    println!(
                        "  {} {} runs raw SQL; only its structural steps were checked",
                        style("ℹ").blue(),
                        id
                    );
                }
                for issue in &report.issues {
                    println!("  {} {}", style("✗").red(), issue);
                }
                if !report.is_ok() {
                    bail!(
                        "{} of {} revision(s) failed the check",
                        report.issues.len(),
                        report.checked
                    );
                }
                println!(
                    "  {} {} revision(s) reverse cleanly",
                    style("✓").green(),
                    report.checked
                );
                println!();
            }

            MigrateAction::Revision {
                message,
                head,
                branch_label,
                depends_on,
            } => {
                let dir = self.script_dir(&config);
                let graph = RevisionGraph::new(load_scripts_from_dir(&dir)?)?;

                let parents = match head.as_deref() {
                    Some(head) => resolve_parents(&graph, head)?,
                    None => match graph.heads().as_slice() {
                        [] => Vec::new(),
                        [one] => vec![one.clone()],
                        many => bail!(
                            "multiple heads ({}); pass --head or create a merge revision",
                            join_ids(many)
                        ),
                    },
                };
                let depends_on = depends_on
                    .iter()
                    .map(|d| graph.resolve_id(d))
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let new = NewRevision {
                    message: message.clone(),
                    parents,
                    branch_labels: branch_label.clone(),
                    depends_on,
                };
                write_script(&dir, &new)?;
            }

            MigrateAction::Merge { message, revisions } => {
                let dir = self.script_dir(&config);
                let graph = RevisionGraph::new(load_scripts_from_dir(&dir)?)?;

                let parents = if revisions.is_empty() {
                    graph.heads()
                } else {
                    revisions
                        .iter()
                        .map(|r| graph.resolve_id(r))
                        .collect::<std::result::Result<Vec<_>, _>>()?
                };
                if parents.len() < 2 {
                    bail!("a merge needs at least two revisions");
                }

                let new = NewRevision {
                    message: message.clone(),
                    parents,
                    ..Default::default()
                };
                write_script(&dir, &new)?;
            }
        }

        Ok(())
    }

    /// File configuration when present, otherwise the environment.
    fn load_config(&self) -> Result<SyspaceConfig> {
        let mut config = if Path::new(&self.config).exists() {
            SyspaceConfig::from_file(&self.config)?
        } else {
            SyspaceConfig::from_env()
                .unwrap_or_else(|_| SyspaceConfig::default_with_database_url(""))
        };

        if let Some(ref url) = self.database_url {
            config.database.url = url.clone();
        }
        if let Some(ref dir) = self.scripts {
            config.migrations.script_location = Some(dir.clone());
        }
        Ok(config)
    }

    fn load_graph(&self, config: &SyspaceConfig) -> Result<RevisionGraph> {
        let source = ScriptSource::pick(config.migrations.script_location.as_deref());
        let scripts = source
            .load()
            .with_context(|| format!("Failed to load revision scripts from {}", source))?;
        tracing::debug!("Loaded {} revision(s) from {}", scripts.len(), source);
        Ok(RevisionGraph::new(scripts)?)
    }

    /// Directory new scripts are written to.
    fn script_dir(&self, config: &SyspaceConfig) -> PathBuf {
        config
            .migrations
            .script_location
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPT_DIR))
    }
}

async fn connect(
    config: &SyspaceConfig,
    graph: RevisionGraph,
) -> Result<MigrationEngine<PgBackend>> {
    if config.database.url.is_empty() {
        bail!(
            "No database configured.\nSet DATABASE_URL, pass --database-url or create syspace.toml."
        );
    }
    MigrationEngine::connect(config, graph)
        .await
        .context("Failed to connect to the database")
}

fn offline_engine(
    config: &SyspaceConfig,
    graph: RevisionGraph,
    start: Option<BTreeSet<RevisionId>>,
) -> MigrationEngine<OfflineBackend> {
    let backend = OfflineBackend::new(&config.migrations.version_table, start);
    MigrationEngine::new(graph, backend, config.migrations.clone())
}

/// Starting marker for offline SQL; `None` means a fresh database.
fn resolve_start(graph: &RevisionGraph, from: Option<&str>) -> Result<Option<BTreeSet<RevisionId>>> {
    let Some(from) = from else {
        return Ok(None);
    };
    let target: Target = from.parse()?;
    Ok(Some(graph.resolve(&target, &BTreeSet::new())?))
}

fn resolve_parents(graph: &RevisionGraph, head: &str) -> Result<Vec<RevisionId>> {
    let target: Target = head.parse()?;
    Ok(graph.resolve(&target, &BTreeSet::new())?.into_iter().collect())
}

fn write_script(dir: &Path, new: &NewRevision) -> Result<()> {
    let generator = ScriptGenerator::new(dir);
    let script = generator.generate(new);
    generator.write(&script)?;
    println!(
        "  {} Generated {} ({})",
        style("✓").green(),
        style(script.path.display()).cyan(),
        script.id
    );
    Ok(())
}

fn join_ids(ids: &[RevisionId]) -> String {
    ids.iter()
        .map(RevisionId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_banner(action: &str) {
    println!();
    println!(
        "  {}  {} {}",
        style("⚒️").bold(),
        style("SYSPACE").bold().cyan(),
        action
    );
    println!();
}

fn print_report(report: &MigrationReport) {
    if report.is_noop() {
        println!(
            "  {} Nothing to do; database is at {}",
            style("ℹ").blue(),
            report.to
        );
        println!();
        return;
    }

    for id in &report.revisions {
        println!("  {} {} {}", style("✓").green(), report.direction, id);
    }
    println!();
    println!(
        "  {} {} -> {} ({} revision(s))",
        style("✓").green(),
        report.from,
        report.to,
        report.revisions.len()
    );
    println!();
}
