use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, error, info};

use crate::aggregate::{aggregate_flow, merge_count_maps, CountMap};
use crate::config::Configuration;
use crate::decoder::RecordDecoder;
use crate::error::AppError;
use crate::filter::is_protected_dns_traffic;

/// Decode, filter, and aggregate every file across a worker pool, then
/// reduce the per-worker partial maps into one `CountMap`. Any worker error
/// aborts the run; no partial allowlist is ever produced.
pub fn run(files: &[PathBuf], config: &Configuration, workers: usize) -> Result<CountMap, AppError> {
    let workers = workers.max(1);
    let queue: Mutex<VecDeque<&Path>> = Mutex::new(files.iter().map(PathBuf::as_path).collect());

    info!(
        "processing {} file(s) across {} worker(s)",
        files.len(),
        workers
    );

    let partials: Vec<Result<CountMap, AppError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let queue = &queue;
                scope.spawn(move || worker_loop(worker_id, queue, config))
            })
            .collect();

        handles.into_iter().map(|h| h.join().expect("worker thread panicked")).collect()
    });

    let mut accumulator = CountMap::new();
    for partial in partials {
        let map = partial?;
        merge_count_maps(&mut accumulator, map);
    }

    info!("merged partial maps into {} source key(s)", accumulator.len());
    Ok(accumulator)
}

fn worker_loop(worker_id: usize, queue: &Mutex<VecDeque<&Path>>, config: &Configuration) -> Result<CountMap, AppError> {
    let mut local = CountMap::new();

    loop {
        let file = {
            let mut guard = queue.lock().expect("work queue mutex poisoned");
            guard.pop_front()
        };
        let file = match file {
            Some(f) => f,
            None => break,
        };

        debug!("worker {} processing {}", worker_id, file.display());
        process_file(file, config, &mut local)?;
    }

    Ok(local)
}

fn process_file(path: &Path, config: &Configuration, data: &mut CountMap) -> Result<(), AppError> {
    let decoder = RecordDecoder::spawn(path).map_err(AppError::from)?;

    for record in decoder {
        let record = record.map_err(|e| {
            error!("aborting run: {}", e);
            AppError::from(e)
        })?;
        if is_protected_dns_traffic(&record, config) {
            aggregate_flow(data, config, &record);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_list_yields_empty_map() {
        let cfg = Configuration::default();
        let result = run(&[], &cfg, 4).unwrap();
        assert!(result.is_empty());
    }
}
