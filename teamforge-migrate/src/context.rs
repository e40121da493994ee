//! Building the gate's collaborators from settings and CLI overrides

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use teamforge::migration::{DirectoryScriptSource, MigrationCatalog};
use teamforge::{PostgresConnector, Settings};

/// Command-line values that take precedence over configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub migrations_dir: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub app_version: Option<String>,
}

/// Everything a command needs
pub struct GateContext {
    pub settings: Settings,
    pub catalog: Arc<MigrationCatalog>,
    pub scripts: Arc<DirectoryScriptSource>,
    pub connector: Arc<PostgresConnector>,
    pub app_version: String,
}

impl GateContext {
    /// Merge `overrides` into `settings` and load the catalog
    ///
    /// The catalog comes from the configured path, then `catalog.json` in
    /// the migrations directory, then the copy bundled into the build.
    pub fn build(mut settings: Settings, overrides: Overrides) -> Result<Self> {
        if let Some(url) = overrides.database_url {
            settings.database.url = Some(url);
        }
        if let Some(dir) = overrides.migrations_dir {
            settings.migrations.dir = dir;
        }
        if overrides.catalog.is_some() {
            settings.migrations.catalog = overrides.catalog;
        }
        if overrides.app_version.is_some() {
            settings.migrations.app_version = overrides.app_version;
        }

        let catalog = Self::load_catalog(&settings)?;
        let app_version = settings
            .migrations
            .app_version
            .clone()
            .or_else(|| catalog.latest_version())
            .context("no application version configured and the catalog is empty")?;

        Ok(Self {
            connector: Arc::new(PostgresConnector::new(settings.database_url())),
            scripts: Arc::new(DirectoryScriptSource::new(settings.migrations.dir.clone())),
            catalog: Arc::new(catalog),
            app_version,
            settings,
        })
    }

    fn load_catalog(settings: &Settings) -> Result<MigrationCatalog> {
        if let Some(path) = &settings.migrations.catalog {
            return MigrationCatalog::load(path)
                .with_context(|| format!("loading catalog {}", path.display()));
        }

        let in_dir = settings.migrations.dir.join("catalog.json");
        if in_dir.exists() {
            log::debug!("using catalog {}", in_dir.display());
            return MigrationCatalog::load(&in_dir)
                .with_context(|| format!("loading catalog {}", in_dir.display()));
        }

        log::debug!("using bundled catalog");
        MigrationCatalog::bundled().context("loading bundled catalog")
    }
}
