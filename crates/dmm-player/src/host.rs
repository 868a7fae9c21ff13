//! Logging host: plays nothing, logs every playback call and prints
//! notifications as JSON lines on stdout.

use dmm_ale::{AleError, AleResult, AudioHost, HostHandle, Notification, StartOptions};
use std::collections::HashMap;

pub struct LoggingHost {
    next_handle: HostHandle,
    supports_ramp: bool,
    voices: HashMap<HostHandle, String>,
}

impl LoggingHost {
    pub fn new(supports_ramp: bool) -> Self {
        Self {
            next_handle: 1,
            supports_ramp,
            voices: HashMap::new(),
        }
    }

    fn label(&self, handle: HostHandle) -> &str {
        self.voices.get(&handle).map(String::as_str).unwrap_or("?")
    }
}

impl AudioHost for LoggingHost {
    fn start_layer(&mut self, path: &str, options: StartOptions) -> AleResult<HostHandle> {
        let handle = self.next_handle;
        self.next_handle += 1;

        log::info!(
            "start #{} '{}' ({}, volume {:.2})",
            handle,
            path,
            if options.looping { "loop" } else { "one-shot" },
            options.initial_volume
        );
        self.voices.insert(handle, path.to_string());
        Ok(handle)
    }

    fn set_volume(&mut self, handle: HostHandle, value: f32) {
        log::debug!("volume #{} '{}' = {:.2}", handle, self.label(handle), value);
    }

    fn ramp_volume(
        &mut self,
        handle: HostHandle,
        from: f32,
        to: f32,
        duration_ms: u64,
    ) -> AleResult<()> {
        if !self.supports_ramp {
            return Err(AleError::HostCapabilityUnavailable(
                "volume ramp".to_string(),
            ));
        }
        log::debug!(
            "ramp #{} '{}' {:.2} -> {:.2} over {} ms",
            handle,
            self.label(handle),
            from,
            to,
            duration_ms
        );
        Ok(())
    }

    fn stop_layer(&mut self, handle: HostHandle) {
        match self.voices.remove(&handle) {
            Some(path) => log::info!("stop #{} '{}'", handle, path),
            None => log::debug!("stop #{} (not playing)", handle),
        }
    }

    fn preload(&mut self, path: &str) {
        log::debug!("preload '{}'", path);
    }

    fn notify(&mut self, notification: Notification) {
        match serde_json::to_string(&notification) {
            Ok(line) => println!("{}", line),
            Err(e) => log::warn!("Cannot encode {} notification: {}", notification.name(), e),
        }
    }
}
