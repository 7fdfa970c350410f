//! Multithreaded stress driver.
//!
//! Workers add and delete items charged to random cgroups on random nodes, a
//! shrinker thread walks nodes with a small budget isolating or rotating what
//! it visits, and a reaper takes cgroups offline while all of that runs. Once
//! quiet, the list must hold exactly `added - deleted - isolated` items.

use anyhow::{bail, Context, Result};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{LruConfig, Stress};
use crate::lru::{ListLru, LruItem, LruLink, LruStatus};
use crate::memcg::Memcg;
use crate::registry::LruRegistry;

/// Object tracked by the stress run. Remembers its owner so it can be deleted.
pub struct StressItem {
    nid: usize,
    memcg: Arc<Memcg>,
    link: LruLink<StressItem>,
}

impl StressItem {
    pub fn new(nid: usize, memcg: Arc<Memcg>) -> Arc<Self> {
        Arc::new(Self {
            nid,
            memcg,
            link: LruLink::new(),
        })
    }

    pub fn nid(&self) -> usize {
        self.nid
    }

    pub fn memcg(&self) -> &Arc<Memcg> {
        &self.memcg
    }
}

impl LruItem for StressItem {
    fn lru_link(&self) -> &LruLink<Self> {
        &self.link
    }
}

/// Totals of one stress run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StressReport {
    pub threads: usize,
    pub added: usize,
    pub deleted: usize,
    pub isolated: usize,
    pub walks: usize,
    pub reparented_memcgs: usize,
    pub reparented_items: usize,
    pub final_count: usize,
}

#[derive(Default)]
struct WorkerTotals {
    added: usize,
    deleted: usize,
    live: Vec<Arc<StressItem>>,
}

/// Builds the cgroup tree: the first half hangs off the root, the rest off a
/// random earlier cgroup. Kmem ids are the creation indexes.
fn build_memcgs(root: &Arc<Memcg>, n: usize) -> Vec<Arc<Memcg>> {
    let mut rng = rand::thread_rng();
    let mut memcgs: Vec<Arc<Memcg>> = Vec::with_capacity(n);
    for idx in 0..n {
        let parent = if idx < n.div_ceil(2) {
            Arc::clone(root)
        } else {
            Arc::clone(&memcgs[rng.gen_range(0..idx)])
        };
        memcgs.push(Memcg::new_child(&parent, idx as u32));
    }
    memcgs
}

fn worker(
    lru: &ListLru<StressItem>,
    root: &Arc<Memcg>,
    memcgs: &[Arc<Memcg>],
    ops: usize,
    deadline: Instant,
    token: &CancellationToken,
) -> Result<WorkerTotals> {
    let mut rng = rand::thread_rng();
    let mut totals = WorkerTotals::default();

    for _ in 0..ops {
        if token.is_cancelled() || Instant::now() >= deadline {
            break;
        }

        if totals.live.is_empty() || rng.gen_bool(0.7) {
            let nid = rng.gen_range(0..lru.nr_nodes());
            let memcg = if memcgs.is_empty() || rng.gen_bool(0.1) {
                Arc::clone(root)
            } else {
                Arc::clone(&memcgs[rng.gen_range(0..memcgs.len())])
            };
            lru.memcg_alloc(&memcg)
                .with_context(|| format!("allocate lists for cgroup {}", memcg.css_id()))?;

            let item = StressItem::new(nid, memcg);
            if lru.add(&item, item.nid(), Some(item.memcg())) {
                totals.added += 1;
            }
            totals.live.push(item);
        } else {
            let item = totals.live.swap_remove(rng.gen_range(0..totals.live.len()));
            // Loses the race against the shrinker when it was isolated first.
            if lru.del(&item, item.nid(), Some(item.memcg())) {
                totals.deleted += 1;
            }
        }
    }

    Ok(totals)
}

/// Walks every node round robin until `token` fires. Returns (isolated, walks).
fn shrinker(lru: &ListLru<StressItem>, walk_budget: usize, token: &CancellationToken) -> (usize, usize) {
    let mut rng = rand::thread_rng();
    let mut isolated = 0;
    let mut walks = 0;
    let mut dispose: Vec<Arc<StressItem>> = Vec::new();

    while !token.is_cancelled() {
        for nid in 0..lru.nr_nodes() {
            let mut budget = walk_budget;
            isolated += lru.walk_node(
                nid,
                |_item, ctx| match rng.gen_range(0..10) {
                    0..=3 => {
                        dispose.push(ctx.isolate());
                        LruStatus::Removed
                    }
                    4 => {
                        dispose.push(ctx.isolate());
                        ctx.unlocked(thread::yield_now);
                        LruStatus::RemovedRetry
                    }
                    5 => {
                        ctx.unlocked(thread::yield_now);
                        LruStatus::Retry
                    }
                    6 => LruStatus::Skip,
                    _ => LruStatus::Rotate,
                },
                &mut budget,
            );
            walks += 1;
            dispose.clear();
        }
        thread::yield_now();
    }

    (isolated, walks)
}

/// Takes cgroups offline one by one, deepest first, spread over `period`.
fn reaper(
    registry: &LruRegistry,
    memcgs: &[Arc<Memcg>],
    period: Duration,
    token: &CancellationToken,
) -> (usize, usize) {
    let victims: Vec<&Arc<Memcg>> = {
        let mut v: Vec<&Arc<Memcg>> = memcgs.iter().collect();
        v.sort_by_key(|m| std::cmp::Reverse(m.level()));
        v.truncate(memcgs.len() / 2);
        v
    };
    if victims.is_empty() {
        return (0, 0);
    }

    let pause = period / (victims.len() as u32 + 1);
    let mut reparented = 0;
    let mut moved = 0;
    for dying in victims {
        let deadline = Instant::now() + pause;
        while Instant::now() < deadline {
            if token.is_cancelled() {
                return (reparented, moved);
            }
            thread::sleep(Duration::from_millis(1).min(pause));
        }
        let Some(parent) = dying.parent() else {
            continue;
        };
        moved += registry.reparent(dying, parent);
        reparented += 1;
    }
    (reparented, moved)
}

/// Runs the stress workload once and checks the list's bookkeeping.
pub fn run(lru_cfg: &LruConfig, cfg: &Stress, token: &CancellationToken) -> Result<StressReport> {
    let threads = if cfg.threads == 0 {
        num_cpus::get()
    } else {
        cfg.threads
    };

    let registry = LruRegistry::new();
    let lru: Arc<ListLru<StressItem>> =
        ListLru::from_config(lru_cfg, &registry).context("build list")?;

    let root = Memcg::root();
    let memcgs = if lru.is_memcg_aware() {
        build_memcgs(&root, cfg.memcgs)
    } else {
        Vec::new()
    };

    info!(
        component = "stress",
        event = "start",
        lru = %lru.name(),
        threads,
        nodes = lru.nr_nodes(),
        memcgs = memcgs.len(),
        duration = ?cfg.duration,
        "stress run started"
    );

    let deadline = Instant::now() + cfg.duration;
    let background = token.child_token();

    let (workers, shrunk, reaped) = thread::scope(|s| {
        let shrinker = s.spawn(|| shrinker(&lru, cfg.walk_budget.max(1), &background));
        let reaper = s.spawn(|| reaper(&registry, &memcgs, cfg.duration, &background));

        let handles: Vec<_> = (0..threads)
            .map(|_| s.spawn(|| worker(&lru, &root, &memcgs, cfg.items_per_thread, deadline, token)))
            .collect();
        let workers: Vec<_> = handles.into_iter().map(|h| h.join()).collect();

        background.cancel();
        (workers, shrinker.join(), reaper.join())
    });

    let Ok((isolated, walks)) = shrunk else {
        bail!("shrinker thread panicked");
    };
    let Ok((reparented_memcgs, reparented_items)) = reaped else {
        bail!("reaper thread panicked");
    };

    let mut report = StressReport {
        threads,
        isolated,
        walks,
        reparented_memcgs,
        reparented_items,
        ..StressReport::default()
    };
    let mut linked = 0;
    for joined in workers {
        let totals = match joined {
            Ok(totals) => totals?,
            Err(_) => bail!("worker thread panicked"),
        };
        report.added += totals.added;
        report.deleted += totals.deleted;
        linked += totals.live.iter().filter(|i| i.lru_link().is_linked()).count();
    }

    report.final_count = lru.count();
    let expected = report.added - report.deleted - report.isolated;
    if report.final_count != expected {
        bail!(
            "count mismatch: list holds {} items, added {} - deleted {} - isolated {} = {}",
            report.final_count,
            report.added,
            report.deleted,
            report.isolated,
            expected
        );
    }
    if linked != report.final_count {
        bail!("{} items still linked but the list counts {}", linked, report.final_count);
    }
    let per_node: usize = (0..lru.nr_nodes()).map(|nid| lru.count_node(nid)).sum();
    if per_node != report.final_count {
        bail!("node totals sum to {} but the list counts {}", per_node, report.final_count);
    }

    debug!(
        component = "stress",
        event = "finish",
        lru = %lru.name(),
        memcg_slots = lru.nr_memcg_slots(),
        "stress run verified"
    );

    Ok(report)
}
