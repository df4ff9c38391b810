use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide pipeline counters, exported by `/metrics`.
pub struct Stats {
    photos_stored: AtomicU64,
    photos_ingested: AtomicU64,
    faces_detected: AtomicU64,
    jobs_enqueued: AtomicU64,
    enqueue_failures: AtomicU64,
    crops_extracted: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_dropped: AtomicU64,
    faces_named: AtomicU64,
    queue_depth: parking_lot::Mutex<Option<Arc<AtomicUsize>>>,
    started: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            photos_stored: AtomicU64::new(0),
            photos_ingested: AtomicU64::new(0),
            faces_detected: AtomicU64::new(0),
            jobs_enqueued: AtomicU64::new(0),
            enqueue_failures: AtomicU64::new(0),
            crops_extracted: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            jobs_dropped: AtomicU64::new(0),
            faces_named: AtomicU64::new(0),
            queue_depth: parking_lot::Mutex::new(None),
            started: Instant::now(),
        }
    }

    /// Attach the depth gauge of the in-process queue, when there is one.
    pub fn track_queue_depth(&self, gauge: Arc<AtomicUsize>) {
        *self.queue_depth.lock() = Some(gauge);
    }

    pub fn inc_photos_stored(&self) { self.photos_stored.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_photos_ingested(&self) { self.photos_ingested.fetch_add(1, Ordering::Relaxed); }
    pub fn add_faces_detected(&self, n: u64) { self.faces_detected.fetch_add(n, Ordering::Relaxed); }
    pub fn add_jobs_enqueued(&self, n: u64) { self.jobs_enqueued.fetch_add(n, Ordering::Relaxed); }
    pub fn add_enqueue_failures(&self, n: u64) { self.enqueue_failures.fetch_add(n, Ordering::Relaxed); }
    pub fn inc_crops_extracted(&self) { self.crops_extracted.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_jobs_retried(&self) { self.jobs_retried.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_jobs_dropped(&self) { self.jobs_dropped.fetch_add(1, Ordering::Relaxed); }
    pub fn inc_faces_named(&self) { self.faces_named.fetch_add(1, Ordering::Relaxed); }

    pub fn photos_stored(&self) -> u64 { self.photos_stored.load(Ordering::Relaxed) }
    pub fn photos_ingested(&self) -> u64 { self.photos_ingested.load(Ordering::Relaxed) }
    pub fn faces_detected(&self) -> u64 { self.faces_detected.load(Ordering::Relaxed) }
    pub fn jobs_enqueued(&self) -> u64 { self.jobs_enqueued.load(Ordering::Relaxed) }
    pub fn enqueue_failures(&self) -> u64 { self.enqueue_failures.load(Ordering::Relaxed) }
    pub fn crops_extracted(&self) -> u64 { self.crops_extracted.load(Ordering::Relaxed) }
    pub fn jobs_retried(&self) -> u64 { self.jobs_retried.load(Ordering::Relaxed) }
    pub fn jobs_dropped(&self) -> u64 { self.jobs_dropped.load(Ordering::Relaxed) }
    pub fn faces_named(&self) -> u64 { self.faces_named.load(Ordering::Relaxed) }
    pub fn uptime_secs(&self) -> u64 { self.started.elapsed().as_secs() }

    pub fn queue_depth(&self) -> Option<usize> {
        self.queue_depth.lock().as_ref().map(|g| g.load(Ordering::Relaxed))
    }

    pub fn metrics_text(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("facetag_uptime_seconds {}\n", self.uptime_secs()));
        s.push_str(&format!("facetag_photos_stored_total {}\n", self.photos_stored()));
        s.push_str(&format!("facetag_photos_ingested_total {}\n", self.photos_ingested()));
        s.push_str(&format!("facetag_faces_detected_total {}\n", self.faces_detected()));
        s.push_str(&format!("facetag_jobs_enqueued_total {}\n", self.jobs_enqueued()));
        s.push_str(&format!("facetag_enqueue_failures_total {}\n", self.enqueue_failures()));
        s.push_str(&format!("facetag_crops_extracted_total {}\n", self.crops_extracted()));
        s.push_str(&format!("facetag_jobs_retried_total {}\n", self.jobs_retried()));
        s.push_str(&format!("facetag_jobs_dropped_total {}\n", self.jobs_dropped()));
        s.push_str(&format!("facetag_faces_named_total {}\n", self.faces_named()));
        if let Some(depth) = self.queue_depth() {
            s.push_str(&format!("facetag_queue_depth {}\n", depth));
        }
        s
    }
}
