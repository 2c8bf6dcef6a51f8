//! Text reports for the `atlas` command line.

use catalog::CatalogConfig;
use layers::backend::{BackendKind, ImageryBackend};
use layers::entry::ImageryEntry;
use layers::scheduler::{PlaybackState, TickReport};
use runtime::clock::ClockTick;
use temporal::axis::AxisBuild;

pub fn describe_axis(build: &AxisBuild) -> Vec<String> {
    let mut lines: Vec<String> = match &build.axis {
        Some(axis) => {
            let mut lines = vec![format!(
                "{} samples, period {}{}",
                axis.len(),
                axis.period().map(|p| p.to_string()).unwrap_or_else(|| "irregular".to_string()),
                if axis.truncated() { ", truncated" } else { "" }
            )];
            lines.extend(axis.tags().map(|t| t.to_string()));
            lines
        }
        None => vec!["not time-varying (single sample)".to_string()],
    };
    lines.extend(build.warnings.iter().map(|w| format!("warning: {w}")));
    lines
}

fn state_name(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Empty => "empty",
        PlaybackState::Seeking => "seeking",
        PlaybackState::Playing => "playing",
    }
}

pub fn describe_tick(
    tick: &ClockTick,
    report: Option<&TickReport>,
    entry: &ImageryEntry,
    backend: &dyn ImageryBackend,
) -> String {
    let tag_of = |index: Option<usize>| {
        index
            .and_then(|i| entry.intervals()?.get(i))
            .map(|i| i.tag.to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    let scheduler = entry.scheduler();
    let current = tag_of(scheduler.and_then(|s| s.current()).map(|s| s.index));
    let next = tag_of(scheduler.and_then(|s| s.next()).map(|s| s.index));

    let stack: Vec<String> = backend
        .layers()
        .iter()
        .map(|l| {
            let tag = l.tag.as_ref().map_or("static", |t| t.as_str());
            let pick = if l.pick_enabled { "*" } else { "" };
            format!("{tag}@{:.2}{pick}", l.opacity)
        })
        .collect();

    let created = report.map_or(0, |r| r.created);
    format!(
        "tick {:>4} {} {:<7} current={current} next={next} created={created} stack=[{}]",
        tick.index,
        tick.time,
        state_name(entry.state()),
        stack.join(", ")
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayOptions {
    pub entry: String,
    pub ticks: u32,
    pub step_ms: i64,
    pub reverse: bool,
    pub backend: Option<BackendKind>,
}

/// Simulates playback of one catalog entry and returns one line per tick,
/// followed by any diagnostics.
pub fn simulate_playback(mut config: CatalogConfig, options: &PlayOptions) -> Result<Vec<String>, String> {
    if let Some(kind) = options.backend {
        config.backend = kind;
    }
    let mut loaded = config.build_workbench().map_err(|e| e.to_string())?;
    let id = loaded
        .id(&options.entry)
        .ok_or_else(|| format!("no entry {:?} in catalog", options.entry))?;

    let workbench = &mut loaded.workbench;
    if options.reverse {
        let m = workbench.clock().multiplier().abs();
        workbench.clock_mut().set_multiplier(-m);
    }
    workbench.enable(id).map_err(|e| e.to_string())?;
    workbench.show(id).map_err(|e| e.to_string())?;

    let mut lines = Vec::new();
    let first = workbench.clock().tick();
    if let Some(entry) = workbench.entry(id) {
        lines.push(describe_tick(&first, None, entry, workbench.backend()));
    }

    for _ in 0..options.ticks {
        let reports = workbench.tick(options.step_ms);
        let tick = workbench.clock().tick();
        let report = reports.iter().find(|(e, _)| *e == id).map(|(_, r)| r);
        if let Some(entry) = workbench.entry(id) {
            lines.push(describe_tick(&tick, report, entry, workbench.backend()));
        }
    }

    lines.extend(
        workbench
            .diagnostics()
            .events()
            .iter()
            .map(|d| format!("diagnostic [{}] {}: {}", d.entry_name, d.title, d.message)),
    );
    Ok(lines)
}
