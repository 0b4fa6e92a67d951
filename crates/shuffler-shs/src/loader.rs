//! The partial-reconfiguration loader collaborator (out of scope per §1):
//! `load_bitstream(path, is_partial) -> Result<(), ReconfigError>`.

/// Builds the fixed partial-bitstream path for a kernel/slot pair (§6).
pub fn partial_bitstream_path(kernel_name: &str, slot: usize) -> String {
    format!("pbs/a3_{kernel_name}_a3_slot_{slot}_partial.bin")
}

pub trait BitstreamLoader: Send + Sync {
    fn load_bitstream(&self, path: &str, is_partial: bool) -> Result<(), ()>;
}

/// A loader that always succeeds, recording the paths it was asked to load
/// — for tests and the hosted build.
#[derive(Default)]
pub struct MockBitstreamLoader {
    loaded: std::sync::Mutex<Vec<String>>,
    fail_next: std::sync::atomic::AtomicBool,
}

impl MockBitstreamLoader {
    pub fn new() -> Self { Self::default() }

    pub fn fail_next(&self) { self.fail_next.store(true, std::sync::atomic::Ordering::SeqCst); }

    pub fn loaded_paths(&self) -> Vec<String> { self.loaded.lock().unwrap().clone() }
}

impl BitstreamLoader for MockBitstreamLoader {
    fn load_bitstream(&self, path: &str, _is_partial: bool) -> Result<(), ()> {
        if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(());
        }
        self.loaded.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_matches_the_fixed_naming_scheme() {
        assert_eq!(partial_bitstream_path("addvector", 2), "pbs/a3_addvector_a3_slot_2_partial.bin");
    }
}
