//! 테스트 케이스와 옵션 빌더
//!
//! [`TestCase`]는 디렉티브 목록, 대상 워크플로, 옵션 묶음을 가집니다.
//! 빌더 메서드는 케이스를 소비하고 돌려주므로 체인으로 구성합니다.
//! 전제 조건을 검사하는 메서드는 `Result`를 반환하며, 실패는 원격 호출 전에
//! [`HarnessError::Configuration`]으로 드러납니다.
//!
//! ```
//! use flowtest_core::stage::Stage;
//! use flowtest_harness::TestCase;
//!
//! let case = TestCase::new(
//!     "XFS with Storage Profile",
//!     ["#DW jobdw type=xfs name=xfs-sp capacity=1TB profile=my-xfs"],
//! )
//! .with_storage_profile()?
//! .stop_after(Stage::PreRun);
//!
//! assert_eq!(case.workflow_name(), "xfs-with-storage-profile");
//! assert!(!case.should_teardown());
//! # Ok::<(), flowtest_harness::HarnessError>(())
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use flowtest_core::directive::{DirectiveArgs, command, parse_args};
use flowtest_core::resources::{
    Computes, DATA_MOVEMENT_NAMESPACE, DEFAULT_NAMESPACE, LustreNamespace, ObjectKey, ObjectMeta,
    Workflow, WorkflowSpec,
};
use flowtest_core::stage::Stage;
use serde_json::Value;

use crate::error::HarnessError;

/// Capacity of a persistent Lustre instance created by an option.
pub const DEFAULT_PERSISTENT_CAPACITY: &str = "50GB";

/// Maximum length of a derived workflow name.
const MAX_NAME_LEN: usize = 63;

/// WLM identity written into every workflow.
const WLM_ID: &str = "flowtest";

/// Well-known labels.
pub mod label {
    pub const SIMPLE: &str = "simple";
    pub const ERROR: &str = "error";
}

/// Scheduling decorators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decorators {
    /// Only focused cases run when any case is focused.
    pub focused: bool,
    /// Pending cases never run.
    pub pending: bool,
    /// Serialized cases never run alongside other cases.
    pub serialized: bool,
}

/// Storage profile to clone from the default profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageProfileOption {
    pub name: String,
    pub external_mgs: Option<String>,
    pub standalone_mgt: Option<String>,
}

/// Overrides applied to a cloned container profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerProfileOverrides {
    pub pre_run_timeout_seconds: Option<i64>,
    pub post_run_timeout_seconds: Option<i64>,
    pub retry_limit: Option<i32>,
    /// Marks every storage of the profile optional.
    pub no_storage: bool,
}

/// Container profile to clone from `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProfileOption {
    pub name: String,
    pub base: String,
    pub overrides: ContainerProfileOverrides,
}

/// Persistent Lustre instance created before the case and destroyed after.
#[derive(Debug, Clone)]
pub struct PersistentInstance {
    pub name: String,
    pub capacity: String,
    pub(crate) create: Box<TestCase>,
    pub(crate) destroy: Box<TestCase>,
    /// 스토리지 준비 완료 후 채워짐
    pub fs_name: Option<String>,
    pub mgs_nids: Option<String>,
}

/// Pool of standalone-MGT persistent instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgsPool {
    pub name: String,
    pub count: usize,
}

/// Global Lustre mount backed by the case's persistent instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalMount {
    /// Object name, `global-<name>`.
    pub name: String,
    /// `/lus/<name>`.
    pub mount_root: String,
    pub namespaces: BTreeMap<String, LustreNamespace>,
    /// Seeded by the copy-in helper before the workflow runs.
    pub source: Option<String>,
    /// Verified by the copy-out helper after DataOut.
    pub destination: Option<String>,
}

/// Persistent instance the case's own directives create, destroyed at cleanup.
#[derive(Debug, Clone)]
pub struct CleanupPersistent {
    pub name: String,
    pub(crate) destroy: Box<TestCase>,
}

/// Options bundle. At most one of each.
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    pub stop_after: Option<Stage>,
    pub expect_error: Option<Stage>,
    pub storage_profile: Option<StorageProfileOption>,
    pub container_profile: Option<ContainerProfileOption>,
    pub persistent: Option<PersistentInstance>,
    pub mgs_pool: Option<MgsPool>,
    pub global_mount: Option<GlobalMount>,
    pub cleanup_persistent: Option<CleanupPersistent>,
    pub duplicate: Option<usize>,
    pub hardware_required: bool,
    pub external_computes: bool,
    pub low_timeout: Option<Duration>,
    pub high_timeout: Option<Duration>,
    /// Sleeps before a stage; every matching pair applies.
    pub delays: Vec<(Stage, Duration)>,
}

impl TestOptions {
    /// Options that create uniquely-named side objects and so block duplication.
    pub fn has_complex_options(&self) -> bool {
        self.storage_profile.is_some()
            || self.container_profile.is_some()
            || self.persistent.is_some()
            || self.global_mount.is_some()
            || self.cleanup_persistent.is_some()
    }

    /// Delays configured for `stage`, in declaration order.
    pub fn delays_for(&self, stage: Stage) -> impl Iterator<Item = Duration> + '_ {
        self.delays
            .iter()
            .filter(move |(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }
}

/// A single declarative test case.
#[derive(Debug, Clone)]
pub struct TestCase {
    name: String,
    directives: Vec<String>,
    workflow: Workflow,
    options: TestOptions,
    labels: Vec<String>,
    decorators: Decorators,
    pub(crate) helper_pods: Vec<ObjectKey>,
    pub(crate) computes: Option<Computes>,
}

impl TestCase {
    /// Creates a case from a name and its directives.
    pub fn new<I, D>(name: impl Into<String>, directives: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        let name = name.into();
        let directives: Vec<String> = directives.into_iter().map(Into::into).collect();
        let workflow_name = workflow_name(&name);

        let workflow = Workflow {
            metadata: ObjectMeta::new(DEFAULT_NAMESPACE, &workflow_name),
            spec: WorkflowSpec {
                desired_state: Stage::Proposal,
                dw_directives: directives.clone(),
                wlm_id: WLM_ID.to_owned(),
                job_id: Value::from(workflow_name),
                user_id: 0,
                group_id: 0,
                extra: Default::default(),
            },
            status: None,
            extra: Default::default(),
        };

        Self {
            name,
            directives,
            workflow,
            options: TestOptions::default(),
            labels: Vec::new(),
            decorators: Decorators::default(),
            helper_pods: Vec::new(),
            computes: None,
        }
    }

    // --- accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    /// The workflow as last read from or written to the store.
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow.metadata.name
    }

    pub fn workflow_key(&self) -> ObjectKey {
        ObjectKey::new(&self.workflow.metadata.namespace, &self.workflow.metadata.name)
    }

    pub fn options(&self) -> &TestOptions {
        &self.options
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn decorators(&self) -> Decorators {
        self.decorators
    }

    /// Helper pods launched for this case, awaiting cleanup.
    pub fn helper_pods(&self) -> &[ObjectKey] {
        &self.helper_pods
    }

    /// Compute assignment made during Setup.
    pub fn computes(&self) -> Option<&Computes> {
        self.computes.as_ref()
    }

    /// Whether the runner drives Teardown and deletes the workflow afterwards.
    pub fn should_teardown(&self) -> bool {
        self.options.expect_error.is_some() || self.options.stop_after.is_none()
    }

    pub(crate) fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.workflow
    }

    pub(crate) fn options_mut(&mut self) -> &mut TestOptions {
        &mut self.options
    }

    // --- infallible builders ---

    /// Adds labels, ignoring ones already present.
    pub fn with_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        for label in labels {
            let label = label.into();
            if !self.has_label(&label) {
                self.labels.push(label);
            }
        }
        self
    }

    pub fn focused(mut self) -> Self {
        self.decorators.focused = true;
        self
    }

    pub fn pending(mut self) -> Self {
        self.decorators.pending = true;
        self
    }

    pub fn serialized(mut self) -> Self {
        self.decorators.serialized = true;
        self
    }

    /// Stops execution once `stage` is reached.
    pub fn stop_after(mut self, stage: Stage) -> Self {
        self.options.stop_after = Some(stage);
        self
    }

    /// Expects `stage` to end in `Error`; execution stops there.
    pub fn expect_error(mut self, stage: Stage) -> Self {
        self.options.expect_error = Some(stage);
        self.options.stop_after = Some(stage);
        self.with_labels([label::ERROR])
    }

    /// Owner uid/gid of the workflow.
    pub fn with_permissions(mut self, user_id: u32, group_id: u32) -> Self {
        self.workflow.spec.user_id = user_id;
        self.workflow.spec.group_id = group_id;
        self
    }

    /// Skips the case when the cluster lacks real hardware.
    pub fn hardware_required(mut self) -> Self {
        self.options.hardware_required = true;
        self
    }

    /// Appends the system's external computes to the assignment.
    pub fn with_external_computes(mut self) -> Self {
        self.options.external_computes = true;
        self
    }

    /// Overrides the run's timeout tiers for this case.
    pub fn with_timeouts(mut self, low: Duration, high: Duration) -> Self {
        self.options.low_timeout = Some(low);
        self.options.high_timeout = Some(high);
        self
    }

    /// Sleeps `delay` before advancing to `stage`.
    pub fn with_delay(mut self, stage: Stage, delay: Duration) -> Self {
        self.options.delays.push((stage, delay));
        self
    }

    /// Creates `count` standalone-MGT persistent instances named `<name>-<i>`
    /// before the case and destroys them after.
    ///
    /// Pool member and profile names come from `name` alone, so duplicated
    /// copies would collide if run together. The case is marked
    /// [`serialized`](Self::serialized).
    pub fn with_mgs_pool(mut self, name: impl Into<String>, count: usize) -> Self {
        self.options.mgs_pool = Some(MgsPool {
            name: name.into(),
            count,
        });
        self.serialized().with_labels(["mgs_pool", "mgs-pool"])
    }

    // --- validated builders ---

    /// Manages the storage profile named by a `jobdw` or `create_persistent`
    /// directive's `profile` argument.
    pub fn with_storage_profile(mut self) -> Result<Self, HarnessError> {
        self.ensure_not_duplicated("storage profile")?;
        let name = self
            .find_argument(
                |args| args.is(command::JOB_DW) || args.is(command::CREATE_PERSISTENT),
                "profile",
            )?
            .ok_or_else(|| self.missing("profile argument"))?;

        self.options.storage_profile = Some(StorageProfileOption {
            name,
            external_mgs: None,
            standalone_mgt: None,
        });
        Ok(self.with_labels(["storage_profile", "storage-profile"]))
    }

    /// Storage profile whose MGT lives in the standalone pool `pool`.
    pub fn with_storage_profile_standalone_mgt(
        self,
        pool: impl Into<String>,
    ) -> Result<Self, HarnessError> {
        let mut case = self.with_storage_profile()?;
        if let Some(profile) = case.options.storage_profile.as_mut() {
            profile.standalone_mgt = Some(pool.into());
        }
        Ok(case.with_labels(["standaloneMGT"]))
    }

    /// Storage profile pointing at an external MGS (`pool:<name>` or a NID).
    pub fn with_storage_profile_external_mgs(
        self,
        mgs: impl Into<String>,
    ) -> Result<Self, HarnessError> {
        let mut case = self.with_storage_profile()?;
        if let Some(profile) = case.options.storage_profile.as_mut() {
            profile.external_mgs = Some(mgs.into());
        }
        Ok(case.with_labels(["externalMGS"]))
    }

    /// Manages the container profile named by a `container` directive, cloned
    /// from `base` with `overrides` applied.
    pub fn with_container_profile(
        mut self,
        base: impl Into<String>,
        overrides: ContainerProfileOverrides,
    ) -> Result<Self, HarnessError> {
        self.ensure_not_duplicated("container profile")?;
        let name = self
            .find_argument(|args| args.is(command::CONTAINER), "profile")?
            .ok_or_else(|| self.missing("profile argument"))?;

        self.options.container_profile = Some(ContainerProfileOption {
            name,
            base: base.into(),
            overrides,
        });
        Ok(self.with_labels(["container_profile", "container-profile"]))
    }

    /// Creates a persistent Lustre instance named `name` before the case and
    /// destroys it after.
    pub fn with_persistent_lustre(mut self, name: impl Into<String>) -> Result<Self, HarnessError> {
        self.ensure_not_duplicated("persistent lustre")?;
        let name = name.into();
        let capacity = DEFAULT_PERSISTENT_CAPACITY.to_owned();

        let create = TestCase::new(
            format!("{name}-create"),
            [format!(
                "#DW create_persistent type=lustre name={name} capacity={capacity}"
            )],
        );
        let destroy = TestCase::new(
            format!("{name}-destroy"),
            [format!("#DW destroy_persistent name={name}")],
        );

        self.options.persistent = Some(PersistentInstance {
            name,
            capacity,
            create: Box::new(create),
            destroy: Box::new(destroy),
            fs_name: None,
            mgs_nids: None,
        });
        Ok(self.with_labels(["persistent", "lustre"]))
    }

    /// Destroys the instance this case's `create_persistent` directive makes.
    pub fn and_cleanup_persistent_instance(mut self) -> Result<Self, HarnessError> {
        self.ensure_not_duplicated("persistent instance cleanup")?;
        let name = self
            .find_argument(|args| args.is(command::CREATE_PERSISTENT), "name")?
            .ok_or_else(|| self.missing("create_persistent directive"))?;

        let destroy = TestCase::new(
            format!("{name}-destroy"),
            [format!("#DW destroy_persistent name={name}")],
        );
        self.options.cleanup_persistent = Some(CleanupPersistent {
            name,
            destroy: Box::new(destroy),
        });
        Ok(self)
    }

    /// Exposes the persistent instance as global Lustre `global-<name>` at
    /// `/lus/<name>`, reachable from `nnf-dm-system` plus `namespaces`.
    ///
    /// `copy_in` sources and `copy_out` destinations in the directives become
    /// the seed and verification paths.
    pub fn with_global_lustre_from_persistent_lustre<I, N>(
        mut self,
        name: &str,
        namespaces: I,
    ) -> Result<Self, HarnessError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.ensure_not_duplicated("global lustre")?;
        if self.options.persistent.is_none() {
            return Err(self.missing("persistent lustre option"));
        }

        let namespaces = std::iter::once(DATA_MOVEMENT_NAMESPACE.to_owned())
            .chain(namespaces.into_iter().map(Into::into))
            .map(|ns| {
                (
                    ns,
                    LustreNamespace {
                        modes: vec!["ReadWriteMany".to_owned()],
                    },
                )
            })
            .collect();

        let mut mount = GlobalMount {
            name: format!("global-{name}"),
            mount_root: format!("/lus/{name}"),
            namespaces,
            source: None,
            destination: None,
        };

        let mut fs_type = String::new();
        for args in self.parsed_directives()? {
            if let Some(t) = args.get("type").filter(|t| !t.is_empty()) {
                fs_type = t.to_owned();
            }
            if args.is(command::COPY_IN) {
                if let Some(source) = args.get("source") {
                    mount.source = Some(source.to_owned());
                }
            } else if args.is(command::COPY_OUT) {
                if let Some(destination) = args.get("destination") {
                    mount.destination = Some(index_mount_path(&fs_type, destination));
                }
            }
        }

        self.options.global_mount = Some(mount);
        Ok(self.with_labels(["global_lustre", "global-lustre"]))
    }

    /// Expands into `count` copies when iterated.
    pub fn duplicate(mut self, count: usize) -> Result<Self, HarnessError> {
        if count == 0 {
            return Err(HarnessError::configuration(
                &self.name,
                "duplicate count must be at least 1",
            ));
        }
        if self.options.has_complex_options() {
            return Err(HarnessError::configuration(
                &self.name,
                format!(
                    "test '{}' has options that cannot be duplicated",
                    self.name
                ),
            ));
        }
        self.options.duplicate = Some(count);
        Ok(self)
    }

    /// Copy number `index` of a duplicated case.
    pub(crate) fn duplicate_copy(&self, index: usize) -> Self {
        let mut copy = self.clone();
        copy.options.duplicate = None;
        copy.name = format!("{}-{index}", self.name);

        let suffix = format!("-{index}");
        let mut base = self.workflow.metadata.name.clone();
        base.truncate(MAX_NAME_LEN.saturating_sub(suffix.len()));
        copy.workflow.metadata.name = format!("{}{suffix}", base.trim_end_matches('-'));
        copy.workflow.spec.job_id = Value::from(copy.workflow.metadata.name.clone());
        copy
    }

    // --- helpers ---

    fn ensure_not_duplicated(&self, option: &str) -> Result<(), HarnessError> {
        if self.options.duplicate.is_some() {
            return Err(HarnessError::configuration(
                &self.name,
                format!("{option} cannot be used on a duplicated test"),
            ));
        }
        Ok(())
    }

    fn missing(&self, what: &str) -> HarnessError {
        HarnessError::configuration(
            &self.name,
            format!("{what} required but not found in test '{}'", self.name),
        )
    }

    fn parsed_directives(&self) -> Result<Vec<DirectiveArgs>, HarnessError> {
        self.directives
            .iter()
            .map(|d| {
                parse_args(d).map_err(|e| HarnessError::configuration(&self.name, e.to_string()))
            })
            .collect()
    }

    /// Value of `key` in the first directive matching `pred` that carries it.
    fn find_argument(
        &self,
        pred: impl Fn(&DirectiveArgs) -> bool,
        key: &str,
    ) -> Result<Option<String>, HarnessError> {
        Ok(self
            .parsed_directives()?
            .iter()
            .filter(|args| pred(args))
            .find_map(|args| args.get(key).map(str::to_owned)))
    }
}

/// Derives a DNS-safe workflow name from a case name.
///
/// Lowercases, collapses runs of other characters into `-`, trims `-` from
/// both ends and caps the length at 63.
pub fn workflow_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let mut out = out.trim_matches('-').to_owned();
    out.truncate(MAX_NAME_LEN);
    out.trim_end_matches('-').to_owned()
}

/// xfs and gfs2 data movement lands under a per-compute index directory, so
/// `dir/base` becomes `dir/*/base`.
fn index_mount_path(fs_type: &str, path: &str) -> String {
    if fs_type != "xfs" && fs_type != "gfs2" {
        return path.to_owned();
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((dir, base)) => {
            let dir = if dir.is_empty() { "/" } else { dir };
            format!("{}/*/{base}", dir.trim_end_matches('/'))
        }
        None => format!("*/{trimmed}"),
    }
}
