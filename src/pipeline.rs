//! The staged conversion scheduler.
//!
//! A run executes four stages on a fixed pool of workers (the calling thread is
//! one of them). Every worker runs the same routine and moves to the next stage
//! only when the stage's [`PhaseGate`] opens:
//!
//! 1. **Load jobs** - parse each requested document, reserve the relations it
//!    references, count its source paths.
//! 2. **Discover relations** - parse each relation's source document and
//!    reserve its relations in turn, until no relation is pending.
//! 3. **Materialize relation maps** - replay each relation source into a
//!    [`RelationMap`] and publish it.
//! 4. **Convert jobs** - replay each job through its output handlers and save.
//!
//! When stage 1 leaves no relation pending, its last worker opens the gates of
//! stages 2 and 3 as well. The first error cancels the run: every gate opens and
//! workers stop at their next inbox poll. A job already being converted is
//! still saved.
//!
//! Relation maps and shared workbooks belong to the run that built them; every
//! [`Pipeline::run`] starts from empty caches and hands them back in its
//! [`RunReport`].

use crate::config::Settings;
use crate::convert::Converter;
use crate::handlers;
use crate::metrics::RunStats;
use crate::relation::{RelationCache, RelationMap};
use crate::schema::{JobDescriptor, Relation};
use crate::source::{SourceProvider, Workbook};
use crate::sync::{KeyedCache, MutexList, MutexMap, PhaseGate};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info};

/// Converter for a set of schema documents.
///
/// Runs share nothing but settings and the cumulative [`RunStats`]: each
/// [`run`](Pipeline::run) reads its relation sources and workbooks afresh.
pub struct Pipeline {
    settings: Settings,
    stats: RunStats,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    /// Jobs converted (including skipped ones).
    pub jobs: usize,
    /// Written files, sorted.
    pub outputs: Vec<PathBuf>,
    /// Documents whose handlers are all `none`.
    pub skipped: Vec<String>,
    /// Relation maps published by the run.
    pub relations: Arc<RelationCache>,
    /// Workbooks the run opened through the shared cache.
    pub workbooks: Arc<KeyedCache<PathBuf, Workbook>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            stats: RunStats::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Counters accumulated over every run of this pipeline.
    #[must_use]
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Convert `targets` (schema document names) and everything they depend on.
    ///
    /// # Errors
    /// Returns the first error any worker hit; outputs saved before it stay on disk.
    pub fn run(&self, targets: &[String]) -> Result<RunReport> {
        let workers = self.settings.jobs.max(1);
        let state = RunState::new(self, targets, workers);
        info!(jobs = workers, targets = state.targets.len(), "run started");

        thread::scope(|s| {
            for _ in 1..workers {
                s.spawn(|| state.work());
            }
            state.work();
        });

        if let Some(err) = state.first_error.lock().take() {
            return Err(err);
        }
        let mut outputs = state.outputs.drain();
        outputs.sort();
        let mut skipped = state.skipped.drain();
        skipped.sort();
        let report = RunReport {
            jobs: state.converted.len() + skipped.len(),
            outputs,
            skipped,
            relations: Arc::clone(&state.relations),
            workbooks: Arc::clone(&state.workbooks),
        };
        info!(
            jobs = report.jobs,
            outputs = report.outputs.len(),
            "run finished"
        );
        Ok(report)
    }
}

struct RelationSource {
    relation: Relation,
    doc: JobDescriptor,
}

/// Everything one run shares between its workers.
struct RunState<'p> {
    pipeline: &'p Pipeline,
    relations: Arc<RelationCache>,
    workbooks: Arc<KeyedCache<PathBuf, Workbook>>,
    targets: MutexList<String>,
    jobs: MutexList<JobDescriptor>,
    pending: MutexList<Relation>,
    /// Relation ids already queued this run.
    reserved: MutexMap<String, ()>,
    relation_sources: MutexList<RelationSource>,
    /// Source path → number of jobs reading it; pruned to shared paths after stage 2.
    source_refs: MutexMap<PathBuf, usize>,
    gates: [PhaseGate; 3],
    cancelled: AtomicBool,
    first_error: Mutex<Option<anyhow::Error>>,
    outputs: MutexList<PathBuf>,
    converted: MutexList<String>,
    skipped: MutexList<String>,
}

impl<'p> RunState<'p> {
    fn new(pipeline: &'p Pipeline, targets: &[String], workers: usize) -> Self {
        let inbox = MutexList::new();
        for target in targets {
            inbox.push_unless(|t: &String| t == target, target.clone());
        }
        Self {
            pipeline,
            relations: Arc::new(RelationCache::new()),
            workbooks: Arc::new(KeyedCache::new()),
            targets: inbox,
            jobs: MutexList::new(),
            pending: MutexList::new(),
            reserved: MutexMap::new(),
            relation_sources: MutexList::new(),
            source_refs: MutexMap::new(),
            gates: [
                PhaseGate::new(workers),
                PhaseGate::new(workers),
                PhaseGate::new(workers),
            ],
            cancelled: AtomicBool::new(false),
            first_error: Mutex::new(None),
            outputs: MutexList::new(),
            converted: MutexList::new(),
            skipped: MutexList::new(),
        }
    }

    fn settings(&self) -> &Settings {
        &self.pipeline.settings
    }

    fn stats(&self) -> &RunStats {
        &self.pipeline.stats
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn provider(&self) -> SourceProvider<'_> {
        SourceProvider::new(
            &self.workbooks,
            &self.source_refs,
            self.settings().no_cache,
            self.stats(),
        )
    }

    fn work(&self) {
        if let Err(err) = self.stages() {
            self.fail(err);
        }
    }

    fn stages(&self) -> Result<()> {
        self.load_jobs()?;
        if self.is_cancelled() {
            return Ok(());
        }
        self.discover_relations()?;
        if self.is_cancelled() {
            return Ok(());
        }
        self.materialize_relations()?;
        if self.is_cancelled() {
            return Ok(());
        }
        self.convert_jobs()
    }

    /// Record `err` if it is the run's first, then cancel and release every gate.
    fn fail(&self, err: anyhow::Error) {
        {
            let mut slot = self.first_error.lock();
            if slot.is_none() {
                error!("{err:#}");
                *slot = Some(err);
            } else {
                debug!(error = %format!("{err:#}"), "dropping secondary error");
            }
        }
        self.cancelled.store(true, Ordering::SeqCst);
        for gate in &self.gates {
            gate.open();
        }
    }

    // Stage 1

    fn load_jobs(&self) -> Result<()> {
        while !self.is_cancelled() {
            let Some(target) = self.targets.pop_front() else {
                break;
            };
            self.load_job(&target)?;
        }
        self.gates[0].arrive(|| {
            if self.pending.is_empty() {
                self.prune_source_refs();
                self.gates[1].open();
                self.gates[2].open();
                info!(jobs = self.jobs.len(), "jobs loaded, no relations");
            } else {
                info!(
                    jobs = self.jobs.len(),
                    relations = self.pending.len(),
                    "jobs loaded"
                );
            }
        });
        self.gates[0].wait();
        Ok(())
    }

    fn load_job(&self, target: &str) -> Result<()> {
        let doc = JobDescriptor::load(target, self.settings())?;
        for relation in doc.relations() {
            self.reserve(relation)?;
        }
        self.count_sources(&doc)?;
        debug!(job = %doc.path, "job loaded");
        self.stats().record_job_loaded();
        self.jobs.push_back(doc);
        Ok(())
    }

    /// Queue `relation` unless this run already has it. Its source document
    /// must exist either way.
    fn reserve(&self, relation: Relation) -> Result<()> {
        self.settings().search_schema_path(&relation.from)?;
        if self.reserved.insert_if_absent(relation.id.clone(), ()) {
            debug!(relation = %relation.id, "relation discovered");
            self.stats().record_relation_discovered();
            self.pending.push_back(relation);
        }
        Ok(())
    }

    fn count_sources(&self, doc: &JobDescriptor) -> Result<()> {
        for path in doc.source_paths()? {
            self.source_refs.add(path, 1);
        }
        Ok(())
    }

    fn prune_source_refs(&self) {
        let removed = self.source_refs.erase_if(|_, count| *count <= 1);
        debug!(
            shared = self.source_refs.len(),
            private = removed,
            "source reference counts pruned"
        );
    }

    // Stage 2

    fn discover_relations(&self) -> Result<()> {
        while !self.is_cancelled() {
            let Some(relation) = self.pending.pop_front() else {
                break;
            };
            let from = relation.from.clone();
            self.load_relation_source(relation)
                .with_context(|| format!("relation source {from}"))?;
        }
        self.gates[1].arrive(|| {
            self.prune_source_refs();
            info!(
                relations = self.relation_sources.len(),
                "relation sources loaded"
            );
        });
        self.gates[1].wait();
        Ok(())
    }

    fn load_relation_source(&self, relation: Relation) -> Result<()> {
        let doc = JobDescriptor::load(&relation.from, self.settings())?;
        for nested in doc.relations() {
            self.reserve(nested)?;
        }
        self.count_sources(&doc)?;
        self.relation_sources
            .push_back(RelationSource { relation, doc });
        Ok(())
    }

    // Stage 3

    fn materialize_relations(&self) -> Result<()> {
        while !self.is_cancelled() {
            let Some(source) = self.relation_sources.pop_back() else {
                break;
            };
            if self.relations.has(&source.relation.id) {
                continue;
            }
            self.materialize(&source)
                .with_context(|| format!("{}: relation={}", source.doc.path, source.relation.id))?;
        }
        self.gates[2].arrive(|| {
            info!(maps = self.relations.len(), "relation maps ready");
        });
        self.gates[2].wait();
        Ok(())
    }

    fn materialize(&self, source: &RelationSource) -> Result<()> {
        let mut map = RelationMap::new(&source.relation, &source.doc)?;
        let provider = self.provider();
        let converter = Converter::new(
            &source.doc,
            &self.relations,
            &provider,
            self.settings(),
            true,
        )?;
        converter.run(&mut map)?;
        map.freeze();
        self.stats().record_relation_replay();
        let entries = map.len();
        let (_, published) = self.relations.publish(map);
        if published {
            self.stats().record_relation_map_published();
        }
        debug!(relation = %source.relation.id, entries, "relation map published");
        Ok(())
    }

    // Stage 4

    fn convert_jobs(&self) -> Result<()> {
        while !self.is_cancelled() {
            let Some(doc) = self.jobs.pop_front() else {
                break;
            };
            self.convert_job(&doc)?;
        }
        Ok(())
    }

    fn convert_job(&self, doc: &JobDescriptor) -> Result<()> {
        if doc.writes_nothing() {
            info!(job = %doc.path, "skip");
            self.stats().record_job_skipped();
            self.skipped.push_back(doc.path.clone());
            return Ok(());
        }
        let relations = self.relations.as_ref();
        let provider = self.provider();
        let converter = Converter::new(doc, relations, &provider, self.settings(), false)?;
        for spec in &doc.handlers {
            let Some(mut handler) = handlers::build(spec, doc, relations)
                .with_context(|| format!("{}: handler.type={}", doc.path, spec.type_name))?
            else {
                continue;
            };
            converter.run(handler.as_mut())?;
            let path = handler.save(&self.settings().output_base_path)?;
            info!(output = %spec.path, "output");
            self.stats().record_output_written();
            self.outputs.push_back(path);
        }
        self.stats().record_job_converted();
        self.converted.push_back(doc.path.clone());
        Ok(())
    }
}
