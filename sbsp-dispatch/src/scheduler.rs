//! Bounded-concurrency scheduling of whole per-genome runs
//!
//! Each item runs on its own scoped thread and occupies one slot of a
//! fixed-size slot table until its thread is observed finished. Items whose
//! configuration cannot be resolved never take a slot.

use crate::executor::panic_message;
use crate::wait::{SleepWait, WaitStrategy};
use sbsp_core::config::SchedulerConfig;
use sbsp_core::{GenomeInfo, GenomeInfoList, SbspResult};
use sbsp_utils::{format_elapsed, format_fraction, progress_bar_for, RunMetadata, WorkLayout};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::ScopedJoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Single-genome list written into every item directory
pub const ITEM_MANIFEST: &str = "query.list";

/// Fixed number of slots, each empty or holding one active entry
#[derive(Debug)]
pub struct ConcurrencySlots<T> {
    slots: Vec<Option<T>>,
}

impl<T> ConcurrencySlots<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity.max(1)).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Place `entry` in a free slot, or hand it back when all are taken
    pub fn occupy(&mut self, entry: T) -> Result<usize, T> {
        match self.slots.iter().position(Option::is_none) {
            Some(i) => {
                self.slots[i] = Some(entry);
                Ok(i)
            }
            None => Err(entry),
        }
    }

    /// Empty every slot whose entry matches `done`, returning those entries
    pub fn release_where(&mut self, mut done: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut released = Vec::new();
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(&mut done) {
                released.extend(slot.take());
            }
        }
        released
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    Completed,
    Failed(String),
    /// Configuration for the item could not be resolved; it never ran
    Unresolved(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub index: usize,
    pub name: String,
    pub status: ItemStatus,
    pub elapsed: Duration,
}

/// Per-item outcomes in input order
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    pub outcomes: Vec<ItemOutcome>,
    /// Most items observed dispatched at once
    pub peak_active: usize,
}

impl ScheduleReport {
    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Completed))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed(_)))
    }

    pub fn unresolved(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Unresolved(_)))
    }

    pub fn is_success(&self) -> bool {
        self.completed() == self.outcomes.len()
    }

    /// Items that did not complete, with their reasons
    pub fn problems(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            ItemStatus::Completed => None,
            ItemStatus::Failed(reason) | ItemStatus::Unresolved(reason) => {
                Some((o.name.as_str(), reason.as_str()))
            }
        })
    }
}

/// What the per-item function receives
#[derive(Debug)]
pub struct ItemTask<'a, R> {
    pub index: usize,
    pub item: &'a GenomeInfo,
    /// Output of the resolve step
    pub resolved: R,
    /// `<work_root>/<name>/<dn_run>/`
    pub workdir: PathBuf,
    /// Single-genome list inside `workdir`
    pub manifest: PathBuf,
}

struct ActiveItem<'scope> {
    index: usize,
    started: Instant,
    handle: ScopedJoinHandle<'scope, SbspResult<()>>,
}

/// Outcome bookkeeping shared by the dispatch and drain phases
struct Tally<'a> {
    items: &'a [GenomeInfo],
    outcomes: Vec<Option<ItemOutcome>>,
    done: usize,
    progress: indicatif::ProgressBar,
}

impl Tally<'_> {
    fn record(&mut self, index: usize, status: ItemStatus, elapsed: Duration) {
        let name = self.items[index].name.clone();
        match &status {
            ItemStatus::Completed => info!("{} completed in {}", name, format_elapsed(elapsed)),
            ItemStatus::Failed(reason) => warn!("{} failed: {}", name, reason),
            ItemStatus::Unresolved(reason) => error!("{} skipped: {}", name, reason),
        }
        self.outcomes[index] = Some(ItemOutcome {
            index,
            name,
            status,
            elapsed,
        });
        self.done += 1;
        self.progress.inc(1);
        info!("Done {}", format_fraction(self.done, self.items.len()));
    }
}

pub struct GenomeScheduler {
    layout: WorkLayout,
    run_name: String,
    max_concurrent: usize,
    poll_interval: Duration,
    wait: Arc<dyn WaitStrategy>,
    progress: bool,
}

impl GenomeScheduler {
    pub fn new(work_root: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            layout: WorkLayout::new(work_root),
            run_name: defaults.dn_run.clone(),
            max_concurrent: max_concurrent.max(1),
            poll_interval: defaults.poll_interval(),
            wait: Arc::new(SleepWait::new()),
            progress: false,
        }
    }

    pub fn from_config(config: &SchedulerConfig, work_root: impl Into<PathBuf>) -> Self {
        Self::new(work_root, config.simultaneous_genomes)
            .with_run_name(&config.dn_run)
            .with_poll_interval(config.poll_interval())
    }

    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_name = run_name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_wait_strategy(mut self, wait: Arc<dyn WaitStrategy>) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run `per_item` for every item with at most `max_concurrent` active
    ///
    /// `resolve` runs first, on the calling thread; an item it rejects is
    /// reported [`ItemStatus::Unresolved`] and takes no slot. A repeated
    /// name is Unresolved as well, since item directories are keyed by name.
    /// Items are dispatched in input order.
    pub fn run_all<R, Res, F>(&self, items: &[GenomeInfo], resolve: Res, per_item: F) -> ScheduleReport
    where
        R: Send,
        Res: Fn(&GenomeInfo) -> SbspResult<R>,
        F: Fn(ItemTask<'_, R>) -> SbspResult<()> + Sync,
    {
        info!(
            "Scheduling {} genomes, at most {} at a time",
            items.len(),
            self.max_concurrent
        );

        let mut tally = Tally {
            items,
            outcomes: (0..items.len()).map(|_| None).collect(),
            done: 0,
            progress: progress_bar_for(items.len() as u64, "Genomes", self.progress),
        };
        let mut peak_active = 0;
        let per_item = &per_item;
        let mut seen: HashSet<&str> = HashSet::new();

        std::thread::scope(|scope| {
            let mut slots: ConcurrencySlots<ActiveItem<'_>> =
                ConcurrencySlots::new(self.max_concurrent);

            for (index, item) in items.iter().enumerate() {
                if !seen.insert(item.name.as_str()) {
                    tally.record(
                        index,
                        ItemStatus::Unresolved(format!("duplicate genome name {}", item.name)),
                        Duration::ZERO,
                    );
                    continue;
                }

                let resolved = match resolve(item) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        tally.record(index, ItemStatus::Unresolved(e.to_string()), Duration::ZERO);
                        continue;
                    }
                };

                let (workdir, manifest) = match self.prepare_item(item) {
                    Ok(paths) => paths,
                    Err(e) => {
                        tally.record(index, ItemStatus::Failed(e.to_string()), Duration::ZERO);
                        continue;
                    }
                };

                while slots.is_full() {
                    self.wait_for_any(&mut slots, &mut tally);
                }

                let task = ItemTask {
                    index,
                    item,
                    resolved,
                    workdir,
                    manifest,
                };
                let spawned = std::thread::Builder::new()
                    .name(format!("sbsp-item-{}", index))
                    .spawn_scoped(scope, move || per_item(task));

                match spawned {
                    Ok(handle) => {
                        let mut entry = ActiveItem {
                            index,
                            started: Instant::now(),
                            handle,
                        };
                        while let Err(back) = slots.occupy(entry) {
                            entry = back;
                            self.wait_for_any(&mut slots, &mut tally);
                        }
                        peak_active = peak_active.max(slots.active());
                        debug!("Dispatched {} ({} active)", item.name, slots.active());
                    }
                    Err(e) => tally.record(
                        index,
                        ItemStatus::Failed(format!("cannot start thread: {}", e)),
                        Duration::ZERO,
                    ),
                }
            }

            while !slots.is_empty() {
                self.wait_for_any(&mut slots, &mut tally);
            }
        });

        tally.progress.finish_and_clear();
        let report = ScheduleReport {
            outcomes: tally.outcomes.into_iter().flatten().collect(),
            peak_active,
        };
        info!(
            "Scheduled {} genomes: {} completed, {} failed, {} unresolved",
            report.outcomes.len(),
            report.completed(),
            report.failed(),
            report.unresolved()
        );
        report
    }

    /// Create the item directory, its genome list and a status record
    fn prepare_item(&self, item: &GenomeInfo) -> SbspResult<(PathBuf, PathBuf)> {
        let workdir = self.layout.create_item_dir(&item.name, &self.run_name)?;
        let manifest = workdir.join(ITEM_MANIFEST);
        GenomeInfoList::new(vec![item.clone()]).to_file(&manifest)?;
        RunMetadata::new(&item.name).save(&workdir)?;
        Ok((workdir, manifest))
    }

    /// Block until at least one active item finishes, then record it
    fn wait_for_any<'scope>(
        &self,
        slots: &mut ConcurrencySlots<ActiveItem<'scope>>,
        tally: &mut Tally<'_>,
    ) {
        loop {
            let finished = slots.release_where(|active| active.handle.is_finished());
            if !finished.is_empty() {
                for active in finished {
                    let status = match active.handle.join() {
                        Ok(Ok(())) => ItemStatus::Completed,
                        Ok(Err(e)) => ItemStatus::Failed(e.to_string()),
                        Err(payload) => ItemStatus::Failed(panic_message(payload)),
                    };
                    self.update_metadata(&tally.items[active.index], &status);
                    tally.record(active.index, status, active.started.elapsed());
                }
                return;
            }
            self.wait.pause(self.poll_interval);
        }
    }

    fn update_metadata(&self, item: &GenomeInfo, status: &ItemStatus) {
        let Ok(workdir) = self.layout.item_dir(&item.name, &self.run_name) else {
            return;
        };
        let mut metadata = RunMetadata::load(&workdir).unwrap_or_else(|_| RunMetadata::new(&item.name));
        match status {
            ItemStatus::Completed => metadata.mark_completed(),
            ItemStatus::Failed(reason) | ItemStatus::Unresolved(reason) => metadata.mark_failed(reason),
        }
        if let Err(e) = metadata.save(&workdir) {
            warn!("Cannot update run status for {}: {:#}", item.name, e);
        }
    }

    pub fn work_root(&self) -> &Path {
        self.layout.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::ImmediateWait;
    use sbsp_core::SbspError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_slots_never_exceed_capacity() {
        let mut slots = ConcurrencySlots::new(2);
        assert_eq!(slots.occupy('a'), Ok(0));
        assert_eq!(slots.occupy('b'), Ok(1));
        assert!(slots.is_full());
        assert_eq!(slots.occupy('c'), Err('c'));

        assert_eq!(slots.release_where(|c| *c == 'a'), vec!['a']);
        assert_eq!(slots.active(), 1);
        assert_eq!(slots.occupy('c'), Ok(0));
    }

    #[test]
    fn test_zero_capacity_means_one() {
        let slots: ConcurrencySlots<u8> = ConcurrencySlots::new(0);
        assert_eq!(slots.capacity(), 1);
    }

    fn genomes(n: usize) -> Vec<GenomeInfo> {
        (0..n).map(|i| GenomeInfo::new(format!("g{}", i))).collect()
    }

    fn scheduler(root: &Path, k: usize) -> GenomeScheduler {
        GenomeScheduler::new(root, k)
            .with_poll_interval(Duration::from_millis(1))
            .with_wait_strategy(Arc::new(ImmediateWait::new()))
    }

    #[test]
    fn test_failures_and_panics_are_reported() {
        let temp = TempDir::new().unwrap();
        let items = genomes(3);

        let report = scheduler(temp.path(), 2).run_all(
            &items,
            |_| Ok(()),
            |task| match task.index {
                0 => Ok(()),
                1 => Err(SbspError::WorkerFailed("chunk 0 failed".into())),
                _ => panic!("pipeline crashed"),
            },
        );

        assert_eq!(report.completed(), 1);
        assert_eq!(report.failed(), 2);
        assert!(!report.is_success());
        assert!(matches!(&report.outcomes[2].status, ItemStatus::Failed(r) if r.contains("pipeline crashed")));

        let meta = RunMetadata::load(&temp.path().join("g1").join("sbsp")).unwrap();
        assert_eq!(meta.status, sbsp_utils::RunStatus::Failed);
    }

    #[test]
    fn test_item_workspace_prepared_before_run() {
        let temp = TempDir::new().unwrap();
        let items = vec![GenomeInfo::new("GCF_1").with_attribute("ancestor", "Archaea")];
        let seen = AtomicUsize::new(0);

        let report = scheduler(temp.path(), 1).with_run_name("run-a").run_all(
            &items,
            |item| Ok(item.ancestor().unwrap_or_default().to_string()),
            |task| {
                assert_eq!(task.resolved, "Archaea");
                assert_eq!(task.workdir, temp.path().join("GCF_1").join("run-a"));
                let list = GenomeInfoList::from_file(&task.manifest)?;
                assert_eq!(list.names(), vec!["GCF_1"]);
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        assert!(report.is_success());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_names_never_share_a_directory() {
        let temp = TempDir::new().unwrap();
        let items = vec![
            GenomeInfo::new("GCF_1"),
            GenomeInfo::new("GCF_2"),
            GenomeInfo::new("GCF_1"),
        ];
        let ran = parking_lot::Mutex::new(Vec::new());

        let report = scheduler(temp.path(), 3).run_all(
            &items,
            |_| Ok(()),
            |task| {
                ran.lock().push(task.index);
                Ok(())
            },
        );

        let mut ran = ran.into_inner();
        ran.sort_unstable();
        assert_eq!(ran, vec![0, 1]);
        assert_eq!(report.completed(), 2);
        assert_eq!(report.unresolved(), 1);
        assert!(
            matches!(&report.outcomes[2].status, ItemStatus::Unresolved(r) if r.contains("duplicate genome name GCF_1"))
        );
        let meta = RunMetadata::load(&temp.path().join("GCF_1").join("sbsp")).unwrap();
        assert_eq!(meta.status, sbsp_utils::RunStatus::Completed);
    }
}
