//! Resolution, generation, staleness and invalidation over the path registry.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use vellum_proxy::{ApiOutcome, ApiRequest, ProxyContext, ProxyError, RuleCache};
use vellum_storage::{
    BackendKind, Clock, FileVersion, PathRegistry, Role, Storage, StorageError,
};
use vellum_template::http::HttpClient;
use vellum_template::{Evaluator, Includes, Scope, Value};

use crate::descriptor::{ApiType, PageDescriptor, ResourceDescriptor};
use crate::error::CacheError;
use crate::metadata::{ArtifactType, FileMetadata, sidecar_path};
use crate::process::process_metrics;
use crate::status::{
    DeletedEntry, EntryKind, EntryRef, FileStatusInfo, HealthCheck, StalenessStatus,
};
use crate::writer::MetadataWriter;

/// Where a cached public artifact can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicFile {
    /// File on the local disk.
    Path(PathBuf),
    /// Bytes read through the backend.
    Content(Vec<u8>),
}

/// Ties the registry, evaluator, rule cache and metadata queue together.
pub struct Orchestrator {
    paths: Arc<PathRegistry>,
    evaluator: Arc<dyn Evaluator>,
    rules: RuleCache,
    proxy: ProxyContext,
    writer: MetadataWriter,
    workdir: String,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("rules", &self.rules)
            .field("writer", &self.writer)
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator over `paths`.
    ///
    /// `workdir` is bound as `pwd` in proxy rules and is the fallback
    /// working directory of role update commands.
    #[must_use]
    pub fn new(
        paths: Arc<PathRegistry>,
        evaluator: Arc<dyn Evaluator>,
        client: HttpClient,
        clock: Arc<dyn Clock>,
        workdir: impl Into<String>,
    ) -> Self {
        let workdir = workdir.into();
        Self {
            rules: RuleCache::new(Arc::clone(&evaluator), clock),
            proxy: ProxyContext {
                evaluator: Arc::clone(&evaluator),
                client,
                pwd: workdir.clone(),
            },
            paths,
            evaluator,
            writer: MetadataWriter::default(),
            workdir,
        }
    }

    #[must_use]
    pub fn paths(&self) -> &PathRegistry {
        &self.paths
    }

    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    #[must_use]
    pub fn rules(&self) -> &RuleCache {
        &self.rules
    }

    /// Block until every scheduled metadata write has completed.
    pub fn flush_metadata(&self) {
        self.writer.flush();
    }

    /// Resolve a public path.
    pub fn check_file(&self, path: &str) -> ResourceDescriptor {
        let public = path.trim_start_matches('/').to_owned();
        if self.paths.public().exists(&public) {
            return ResourceDescriptor::Unknown { public };
        }
        let descriptor = format!("{public}.yml");
        if self.paths.pages().exists(&descriptor) {
            return ResourceDescriptor::Page { public, descriptor };
        }
        if self.paths.assets().exists(&public) {
            return ResourceDescriptor::Asset {
                source: public.clone(),
                public,
            };
        }
        ResourceDescriptor::NotFound { name: public }
    }

    /// Resolve an API path.
    pub fn check_api(&self, api: ApiType, path: &str) -> ResourceDescriptor {
        match api {
            ApiType::Proxy => {
                let private = vellum_proxy::private_path(path);
                let source = vellum_proxy::source_path(path);
                if self.paths.private().exists(&private) {
                    ResourceDescriptor::ApiProxy {
                        private,
                        source,
                        exists: true,
                    }
                } else if self.paths.apis().exists(&source) {
                    ResourceDescriptor::ApiProxy {
                        private,
                        source,
                        exists: false,
                    }
                } else {
                    ResourceDescriptor::NotFound { name: private }
                }
            }
        }
    }

    /// Render a page into Public.
    ///
    /// Returns `false` if the descriptor cannot be parsed or rendering fails.
    /// Missing content and template files are logged and skipped.
    pub fn generate_page(&self, resource: &ResourceDescriptor) -> bool {
        let ResourceDescriptor::Page { public, descriptor } = resource else {
            tracing::warn!("{} is not a page", resource.name());
            return false;
        };
        match self.render_page(public, descriptor) {
            Ok(page) => {
                let paths = Arc::clone(&self.paths);
                let (public, descriptor) = (public.clone(), descriptor.clone());
                self.writer.schedule(move || {
                    let metadata = page_metadata(&paths, &public, &descriptor, &page);
                    write_metadata(&paths, metadata);
                });
                true
            }
            Err(e) => {
                tracing::error!("Cannot generate page {descriptor}: {e}");
                false
            }
        }
    }

    fn render_page(&self, public: &str, descriptor: &str) -> Result<PageDescriptor, CacheError> {
        let page = PageDescriptor::from_yaml(&self.paths.pages().read(descriptor)?)?;

        let mut scope = Scope::new();
        for file in &page.content_files {
            if !self.paths.contents().exists(file) {
                tracing::warn!("Cannot find content file {file} for page {descriptor}");
                continue;
            }
            let content: BTreeMap<String, serde_yaml::Value> =
                serde_yaml::from_str(&self.paths.contents().read(file)?)?;
            scope.push_map(content);
        }
        if let Some(content) = &page.content {
            scope.push_map(content.clone());
        }

        let mut bodies = Vec::with_capacity(page.template_files.len());
        for file in &page.template_files {
            if self.paths.templates().exists(file) {
                bodies.push(self.paths.templates().read(file)?);
            } else {
                tracing::warn!("Cannot find template file {file} for page {descriptor}");
            }
        }

        let templates = Arc::clone(&self.paths.entry(Role::Templates).storage);
        let includes = Includes::new(
            page.template_includes.iter().cloned(),
            Arc::new(move |name: &str| templates.read(name).ok()),
        );
        let output = self
            .evaluator
            .render(&bodies.join("\n"), &scope, Some(&includes))?;

        self.paths.public().write(public, &output)?;
        tracing::debug!("Generated {public} from {descriptor}");
        Ok(page)
    }

    /// Copy an asset into Public.
    pub fn copy_asset(&self, resource: &ResourceDescriptor) -> bool {
        let ResourceDescriptor::Asset { public, source } = resource else {
            tracing::warn!("{} is not an asset", resource.name());
            return false;
        };
        if let Err(e) = self
            .paths
            .public()
            .copy_from(source, self.paths.assets(), public)
        {
            tracing::error!("Cannot copy asset {source}: {e}");
            return false;
        }
        // Memory public roles do not hold assets; they are served from Assets.
        if self.paths.public().kind() != BackendKind::Memory {
            let paths = Arc::clone(&self.paths);
            let (public, source) = (public.clone(), source.clone());
            self.writer.schedule(move || {
                let metadata = copy_metadata(&paths, ArtifactType::Asset, &public, &source);
                write_metadata(&paths, metadata);
            });
        }
        true
    }

    /// Copy a proxy descriptor into Private.
    pub fn copy_api(&self, resource: &ResourceDescriptor) -> bool {
        let ResourceDescriptor::ApiProxy {
            private, source, ..
        } = resource
        else {
            tracing::warn!("{} is not an api", resource.name());
            return false;
        };
        if let Err(e) = self
            .paths
            .private()
            .copy_from(source, self.paths.apis(), private)
        {
            tracing::error!("Cannot copy api {source}: {e}");
            return false;
        }
        self.rules.remove(private);
        let paths = Arc::clone(&self.paths);
        let (private, source) = (private.clone(), source.clone());
        self.writer.schedule(move || {
            let metadata = copy_metadata(&paths, ArtifactType::Api, &private, &source);
            write_metadata(&paths, metadata);
        });
        true
    }

    /// Run the proxy rule for an API.
    pub fn execute_api(&self, resource: &ResourceDescriptor, request: &ApiRequest) -> ApiOutcome {
        let ResourceDescriptor::ApiProxy { private, .. } = resource else {
            return ApiOutcome::Error(ProxyError::Missing(resource.name().to_owned()));
        };
        let outcome = match self.rules.get_or_compile(private, self.paths.private()) {
            Ok(Some(rule)) => rule.execute(request, &self.proxy),
            Ok(None) => ApiOutcome::Error(ProxyError::Missing(private.clone())),
            Err(e) => ApiOutcome::Error(e),
        };
        if let ApiOutcome::Error(e) = &outcome {
            tracing::warn!("Api {private} failed: {e}");
        }
        outcome
    }

    /// Locate a cached public artifact for serving.
    pub fn public_file(&self, resource: &ResourceDescriptor) -> Result<PublicFile, CacheError> {
        let public = self.paths.public();
        match resource {
            ResourceDescriptor::Unknown { public: name }
            | ResourceDescriptor::Page { public: name, .. } => read_public(public, name),
            ResourceDescriptor::Asset {
                public: name,
                source,
            } => {
                if public.kind() == BackendKind::Memory {
                    read_public(self.paths.assets(), source)
                } else {
                    read_public(public, name)
                }
            }
            ResourceDescriptor::ApiProxy { .. } | ResourceDescriptor::NotFound { .. } => {
                Err(CacheError::NotServable(resource.name().to_owned()))
            }
        }
    }

    /// Compute the status of every cached artifact.
    ///
    /// Sidecars are checked first, one entry per tracked side. Cached files
    /// with no sidecar follow as orphans.
    pub fn list_generated_files_status(&self, with_hash: bool) -> Vec<FileStatusInfo> {
        let mut generated = Vec::new();

        let sidecars = match self.paths.metadata().list("*.yml") {
            Ok(files) => files,
            Err(e) => {
                tracing::error!("Cannot list metadata files: {e}");
                Vec::new()
            }
        };
        for file in sidecars {
            let metadata = self
                .paths
                .metadata()
                .read(&file)
                .map_err(CacheError::from)
                .and_then(|yaml| Ok(FileMetadata::from_yaml(&yaml)?));
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::error!("Cannot read metadata file {file}: {e}");
                    generated.push(FileStatusInfo::new(
                        EntryKind::Unknown,
                        file,
                        StalenessStatus::MetadataCorrupted,
                    ));
                    continue;
                }
            };
            let status = self.staleness(&metadata, with_hash);
            let kind = EntryKind::from(metadata.artifact);
            for side in [&metadata.public, &metadata.private].into_iter().flatten() {
                generated.push(FileStatusInfo::new(kind, side.name.clone(), status));
            }
        }

        self.collect_orphans(self.paths.private(), EntryKind::Private, &mut generated);
        self.collect_orphans(self.paths.public(), EntryKind::Public, &mut generated);
        generated
    }

    fn collect_orphans(
        &self,
        storage: &dyn Storage,
        side: EntryKind,
        generated: &mut Vec<FileStatusInfo>,
    ) {
        let same_side = |kind: EntryKind| {
            if side.is_private() {
                kind.is_private()
            } else {
                kind.is_public()
            }
        };
        let files = match storage.list("*") {
            Ok(files) => files,
            Err(e) => {
                tracing::error!("Cannot list {} files: {e}", storage.role());
                return;
            }
        };
        for file in files {
            let tracked = generated
                .iter()
                .any(|info| info.name == file && same_side(info.kind));
            if !tracked {
                generated.push(FileStatusInfo::new(side, file, StalenessStatus::Orphan));
            }
        }
    }

    /// Staleness of one sidecar against the current sources.
    pub fn staleness(&self, metadata: &FileMetadata, with_hash: bool) -> StalenessStatus {
        match self.try_staleness(metadata, with_hash) {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(
                    "Cannot check status of {}: {e}",
                    metadata.artifact_name().unwrap_or("<unnamed>")
                );
                StalenessStatus::Error
            }
        }
    }

    fn try_staleness(
        &self,
        metadata: &FileMetadata,
        with_hash: bool,
    ) -> Result<StalenessStatus, StorageError> {
        use StalenessStatus as S;

        let paths = &self.paths;
        let first_change = match metadata.artifact {
            ArtifactType::Api => {
                let (Some(private), Some(api)) = (&metadata.private, &metadata.api) else {
                    return Ok(S::MetadataCorrupted);
                };
                if !paths.private().exists(&private.name) {
                    return Ok(S::Removed);
                }
                changed(paths.apis(), api, with_hash, S::ApiRemoved, S::ApiModified)?
            }
            ArtifactType::Asset => {
                let (Some(public), Some(asset)) = (&metadata.public, &metadata.asset) else {
                    return Ok(S::MetadataCorrupted);
                };
                if !paths.public().exists(&public.name) {
                    return Ok(S::Removed);
                }
                changed(paths.assets(), asset, with_hash, S::AssetRemoved, S::AssetModified)?
            }
            ArtifactType::Page => {
                let (Some(public), Some(page), Some(templates)) =
                    (&metadata.public, &metadata.page, &metadata.templates)
                else {
                    return Ok(S::MetadataCorrupted);
                };
                if templates.is_empty() {
                    return Ok(S::MetadataCorrupted);
                }
                let mut first = changed(paths.public(), public, with_hash, S::Removed, S::Modified)?;
                if first.is_none() {
                    first = changed(paths.pages(), page, with_hash, S::PageRemoved, S::PageModified)?;
                }
                for content in metadata.contents.iter().flatten() {
                    if first.is_some() {
                        break;
                    }
                    first = changed(
                        paths.contents(),
                        content,
                        with_hash,
                        S::ContentRemoved,
                        S::ContentModified,
                    )?;
                }
                for template in templates {
                    if first.is_some() {
                        break;
                    }
                    first = changed(
                        paths.templates(),
                        template,
                        with_hash,
                        S::TemplateRemoved,
                        S::TemplateModified,
                    )?;
                }
                first
            }
        };
        Ok(first_change.unwrap_or(S::UpToDate))
    }

    /// Delete one cached artifact and its sidecar.
    pub fn delete_file(&self, kind: EntryKind, name: &str) -> bool {
        if kind == EntryKind::Unknown {
            return false;
        }
        match self.try_delete(kind, name) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Cannot delete {kind:?} file {name}: {e}");
                false
            }
        }
    }

    fn try_delete(&self, kind: EntryKind, name: &str) -> Result<(), StorageError> {
        if kind.is_private() {
            if self.paths.private().exists(name) {
                self.paths.private().delete(name)?;
            }
            self.rules.remove(name);
        }
        if kind.is_public() && self.paths.public().exists(name) {
            self.paths.public().delete(name)?;
        }
        let sidecar = sidecar_path(name);
        if self.paths.metadata().exists(&sidecar) {
            self.paths.metadata().delete(&sidecar)?;
        }
        Ok(())
    }

    /// Delete several entries, returning those that were deleted.
    pub fn delete_files(&self, entries: &[EntryRef]) -> Vec<EntryRef> {
        entries
            .iter()
            .filter(|entry| self.delete_file(entry.kind, &entry.file))
            .cloned()
            .collect()
    }

    /// Delete every entry that is not up to date.
    pub fn delete_outdated(&self, with_hash: bool) -> Vec<DeletedEntry> {
        self.list_generated_files_status(with_hash)
            .into_iter()
            .filter(|info| !info.status.is_up_to_date())
            .map(|info| DeletedEntry {
                deleted: self.delete_file(info.kind, &info.name),
                file: info.name,
                reason: info.status,
            })
            .collect()
    }

    /// Empty Metadata, Private and Public and drop every compiled rule.
    ///
    /// Returns the files that could not be deleted.
    pub fn delete_all(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for role in [Role::Metadata, Role::Private, Role::Public] {
            for error in self.paths.get(role).delete_all() {
                tracing::warn!("Cannot delete from {role}: {error}");
                failed.push(
                    error
                        .path
                        .as_ref()
                        .map_or_else(|| error.to_string(), |p| p.display().to_string()),
                );
            }
        }
        self.rules.clear();
        failed
    }

    /// Probe writability of the roles generation writes to.
    pub fn health_check(&self) -> BTreeMap<String, HealthCheck> {
        [Role::Metadata, Role::Private, Role::Public]
            .into_iter()
            .map(|role| {
                let check = match self.paths.get(role).is_writable() {
                    Ok(()) => HealthCheck::ok(),
                    Err(e) => HealthCheck::failed(e),
                };
                (format!("{}Writable", role.label()), check)
            })
            .collect()
    }

    /// File counts, byte totals and process counters.
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        for (role, entry) in self.paths.iter() {
            let role_metrics = entry.storage.metrics("*");
            for error in &role_metrics.errors {
                tracing::debug!("Metrics for {role}: {error}");
            }
            metrics.insert(format!("{}Files", role.label()), role_metrics.file_count as f64);
            metrics.insert(format!("{}Bytes", role.label()), role_metrics.total_bytes as f64);
        }
        metrics.insert("CompiledApis".to_owned(), self.rules.len() as f64);
        for (name, value) in process_metrics() {
            metrics.insert(name.to_owned(), value);
        }
        metrics
    }

    /// Run a role's `update_command` and return its text.
    pub fn update_role(&self, role: Role, request: &ApiRequest) -> Result<String, CacheError> {
        #[derive(Serialize)]
        struct PathInfo<'a> {
            role: Role,
            kind: BackendKind,
            root: &'a str,
        }

        let entry = self.paths.entry(role);
        let command = entry
            .config
            .update_command
            .as_deref()
            .ok_or(CacheError::NoUpdateCommand(role))?;
        let pwd = entry
            .storage
            .local_root()
            .filter(|root| root.is_dir())
            .map_or_else(|| self.workdir.clone(), |root| root.display().to_string());

        let scope = Scope::new()
            .with(
                "path",
                Value::from_serialize(PathInfo {
                    role,
                    kind: entry.config.kind,
                    root: &entry.config.root,
                }),
            )
            .with("pwd", Value::from(pwd))
            .with("request", Value::from_serialize(request));

        let value = self.evaluator.evaluate(command, &scope)?;
        tracing::info!("Ran update command for {role}");
        Ok(if value.is_undefined() || value.is_none() {
            String::new()
        } else {
            value.as_str().map_or_else(|| value.to_string(), str::to_owned)
        })
    }
}

fn read_public(storage: &dyn Storage, name: &str) -> Result<PublicFile, CacheError> {
    match storage.local_root() {
        Some(root) => Ok(PublicFile::Path(root.join(name))),
        None => Ok(PublicFile::Content(storage.read_bytes(name)?)),
    }
}

/// First-tier change of a recorded source: removal, then version mismatch.
fn changed(
    storage: &dyn Storage,
    version: &FileVersion,
    with_hash: bool,
    removed: StalenessStatus,
    modified: StalenessStatus,
) -> Result<Option<StalenessStatus>, StorageError> {
    if !storage.exists(&version.name) {
        return Ok(Some(removed));
    }
    if !storage.compare_version(version, with_hash)? {
        return Ok(Some(modified));
    }
    Ok(None)
}

fn copy_metadata(
    paths: &PathRegistry,
    artifact: ArtifactType,
    target: &str,
    source: &str,
) -> Option<FileMetadata> {
    let result = match artifact {
        ArtifactType::Api => paths
            .private()
            .compute_version(target)
            .and_then(|private| Ok(FileMetadata::api(private, paths.apis().compute_version(source)?))),
        ArtifactType::Asset => paths
            .public()
            .compute_version(target)
            .and_then(|public| Ok(FileMetadata::asset(public, paths.assets().compute_version(source)?))),
        ArtifactType::Page => return None,
    };
    result
        .inspect_err(|e| tracing::error!("Cannot compute metadata for {target}: {e}"))
        .ok()
}

fn page_metadata(
    paths: &PathRegistry,
    public: &str,
    descriptor: &str,
    page: &PageDescriptor,
) -> Option<FileMetadata> {
    let templates = page.tracked_templates();
    if templates.is_empty() {
        return None;
    }
    let compute = || -> Result<FileMetadata, StorageError> {
        let contents = page
            .content_files
            .iter()
            .map(|file| paths.contents().compute_version(file))
            .collect::<Result<Vec<_>, _>>()?;
        let templates = templates
            .iter()
            .map(|file| paths.templates().compute_version(file))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FileMetadata::page(
            paths.public().compute_version(public)?,
            paths.pages().compute_version(descriptor)?,
            contents,
            templates,
        ))
    };
    compute()
        .inspect_err(|e| tracing::error!("Cannot compute metadata for {public}: {e}"))
        .ok()
}

fn write_metadata(paths: &PathRegistry, metadata: Option<FileMetadata>) {
    let Some(metadata) = metadata else {
        return;
    };
    let Some(sidecar) = metadata.sidecar_path() else {
        return;
    };
    let written = metadata
        .to_yaml()
        .map_err(|e| e.to_string())
        .and_then(|yaml| paths.metadata().write(&sidecar, &yaml).map_err(|e| e.to_string()));
    if let Err(e) = written {
        tracing::error!("Cannot write metadata {sidecar}: {e}");
    }
}
