//! Fixed-size worker pool draining a pre-filled queue of frame jobs.
//!
//! The queue holds job indices and is closed before the first worker starts,
//! so every index is received by exactly one worker. Workers report through a
//! shared result channel that the calling thread drains until it has one
//! result per job.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::convert::convert_frame;
use crate::error::FrameError;
use crate::frame::{FrameJob, FrameResult};

/// Convert every job with at most `workers` threads.
///
/// `on_result` is called on the calling thread as results arrive, in
/// completion order. The returned vector holds exactly one result per job,
/// in the same completion order.
pub fn run_pool<F>(jobs: &[FrameJob], workers: usize, mut on_result: F) -> Vec<FrameResult>
where
    F: FnMut(&FrameJob, &FrameResult),
{
    if jobs.is_empty() {
        return Vec::new();
    }

    let (queue_tx, queue_rx) = bounded::<usize>(jobs.len());
    for index in 0..jobs.len() {
        // capacity covers every index and the receiver is held above
        let _ = queue_tx.send(index);
    }
    drop(queue_tx);

    let (result_tx, result_rx) = unbounded::<FrameResult>();
    let worker_count = workers.clamp(1, jobs.len());
    debug!(worker_count, frames = jobs.len(), "starting frame workers");

    thread::scope(|s| {
        for _ in 0..worker_count {
            let queue = queue_rx.clone();
            let results = result_tx.clone();
            s.spawn(move || drain_queue(jobs, queue, results));
        }
        drop(result_tx);

        let mut collected = Vec::with_capacity(jobs.len());
        while collected.len() < jobs.len() {
            // Only disconnects early if a worker panicked; the scope rethrows it.
            let Ok(result) = result_rx.recv() else { break };
            on_result(&jobs[result.index], &result);
            collected.push(result);
        }
        collected
    })
}

fn drain_queue(jobs: &[FrameJob], queue: Receiver<usize>, results: Sender<FrameResult>) {
    for index in queue.iter() {
        let outcome = convert_job(&jobs[index]);
        if results.send(FrameResult { index, outcome }).is_err() {
            return;
        }
    }
}

/// Convert one frame from disk to disk.
///
/// On failure after the destination was created, the partial file is removed.
pub fn convert_job(job: &FrameJob) -> Result<(), FrameError> {
    let mut source = File::open(&job.source_path).map_err(|source| FrameError::SourceOpen {
        path: job.source_path.clone(),
        source,
    })?;
    let mut raw = Vec::new();
    source.read_to_end(&mut raw).map_err(|source| FrameError::SourceRead {
        path: job.source_path.clone(),
        source,
    })?;
    drop(source);

    let dest_path = &job.absolute_output_path;
    let create_err = |source| FrameError::DestinationCreate {
        path: dest_path.clone(),
        source,
    };
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(create_err)?;
    }
    let dest = File::create(dest_path).map_err(create_err)?;

    let written = write_png(&raw, dest, job);
    if written.is_err() {
        remove_partial(dest_path);
    }
    written
}

fn write_png(raw: &[u8], dest: File, job: &FrameJob) -> Result<(), FrameError> {
    let mut writer = BufWriter::new(dest);
    convert_frame(raw, &mut writer, job.target_size, job.compression)?;
    writer.flush().map_err(|source| FrameError::DestinationWrite {
        path: job.absolute_output_path.clone(),
        source,
    })
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove partial output");
    }
}
