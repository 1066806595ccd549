// Combined device: presents several physical tracking devices as one, merging
// their frames every tick with a frame combiner

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nalgebra::{Isometry3, Vector3};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::combiner::{create_combiner, FrameCombiner};
use super::config::FusionConfig;
use super::events::{CallbackDelegate, EventQueue, EventSink};
use super::vector_hand;
use crate::models::{
    head_mounted_rotation, CombinerClass, DeviceDescriptor, DeviceOptions, DeviceProperties,
    DeviceType, FrameSnapshot, FusionError, FusionResult, Handedness, SourceFrame, TrackingMode,
};
use crate::platform::{HandTrackingWrapper, JointOcclusionSource, ServiceConnector, TrackingDevice};

const SERIAL_PREFIX: &str = "Combined - ";
const SERIAL_SUFFIX_LEN: usize = 4;

// ==============================================================================
// Ids
// ==============================================================================

/// Hands out device ids for combined devices
#[derive(Debug)]
pub struct CombinerIdGenerator {
    next: AtomicU32,
}

impl Default for CombinerIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CombinerIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Serial for a combined device, built from the tail of each source serial
pub fn combined_serial(source_serials: &[String]) -> String {
    let mut serial = String::from(SERIAL_PREFIX);
    for source in source_serials {
        let chars: Vec<char> = source.chars().collect();
        let start = chars.len().saturating_sub(SERIAL_SUFFIX_LEN);
        serial.extend(&chars[start..]);
        serial.push(' ');
    }
    serial
}

/// Frame between `previous` and `current` at `timestamp_us`. Outside that range
/// the nearer frame is returned unchanged.
pub fn interpolate_frames(
    previous: &FrameSnapshot,
    current: &FrameSnapshot,
    timestamp_us: i64,
) -> FrameSnapshot {
    if current.timestamp_us <= previous.timestamp_us || timestamp_us >= current.timestamp_us {
        return current.clone();
    }
    if timestamp_us <= previous.timestamp_us {
        return previous.clone();
    }

    let alpha = (timestamp_us - previous.timestamp_us) as f32
        / (current.timestamp_us - previous.timestamp_us) as f32;

    let mut frame = FrameSnapshot::new(current.frame_id, timestamp_us);
    for handedness in Handedness::ALL {
        let hand = match (previous.hand(handedness), current.hand(handedness)) {
            (Some(before), Some(after)) => vector_hand::interpolate(before, after, alpha, after.id),
            (None, Some(after)) => Some(after.clone()),
            (Some(before), None) if alpha < 0.5 => Some(before.clone()),
            _ => None,
        };
        if let Some(hand) = hand {
            frame.insert_hand(hand);
        }
    }
    frame
}

// ==============================================================================
// Device Combiner
// ==============================================================================

pub struct DeviceCombiner {
    instance_id: Uuid,
    device_id: u32,
    serial: String,
    class: CombinerClass,
    sources: Vec<Arc<dyn TrackingDevice>>,
    combiner: Box<dyn FrameCombiner>,
    connector: Option<Arc<dyn ServiceConnector>>,
    events: EventQueue,
    delegate: Option<Box<dyn CallbackDelegate>>,
    is_open: bool,
    close_timeout: Duration,
    current_frame: Option<FrameSnapshot>,
    previous_frame: Option<FrameSnapshot>,
    properties: Mutex<DeviceProperties>,
}

impl DeviceCombiner {
    pub fn new(
        sources: Vec<Arc<dyn TrackingDevice>>,
        class: CombinerClass,
        config: &FusionConfig,
        ids: &CombinerIdGenerator,
        connector: Option<Arc<dyn ServiceConnector>>,
    ) -> FusionResult<Self> {
        if sources.is_empty() {
            return Err(FusionError::NoSourceDevices);
        }
        config.validate()?;

        let device_id = ids.next_id();
        let source_serials: Vec<String> = sources.iter().map(|source| source.serial()).collect();
        let serial = combined_serial(&source_serials);

        let (h_fov_deg, v_fov_deg) = sources
            .iter()
            .map(|source| source.device_type().field_of_view())
            .fold((0.0f32, 0.0f32), |(h, v), (sh, sv)| (h.max(sh), v.max(sv)));

        let properties = DeviceProperties {
            device_id,
            serial: serial.clone(),
            device_type: DeviceType::Combined,
            h_fov_deg,
            v_fov_deg,
        };

        let instance_id = Uuid::new_v4();
        info!(
            "Created {} combiner {} ({}) over {} devices",
            class.to_string(),
            serial,
            instance_id,
            sources.len()
        );

        Ok(Self {
            instance_id,
            device_id,
            serial,
            class,
            sources,
            combiner: create_combiner(class, config, device_id),
            connector,
            events: EventQueue::new(config.combiner.event_queue_capacity),
            delegate: None,
            is_open: false,
            close_timeout: Duration::from_millis(config.combiner.close_timeout_ms),
            current_frame: None,
            previous_frame: None,
            properties: Mutex::new(properties),
        })
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn class(&self) -> CombinerClass {
        self.class
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn source_serials(&self) -> Vec<String> {
        self.sources.iter().map(|source| source.serial()).collect()
    }

    /// Handle for posting service events from any thread
    pub fn event_sink(&self) -> EventSink {
        self.events.sink()
    }

    pub fn combiner(&self) -> &dyn FrameCombiner {
        self.combiner.as_ref()
    }

    pub fn update_joint_occlusions(&mut self, source: &dyn JointOcclusionSource) {
        self.combiner.update_joint_occlusions(source);
    }

    pub fn joint_occlusion_confidences(&self, serial: &str) -> Option<(Vec<f32>, Vec<f32>)> {
        self.combiner.joint_occlusion_confidences(serial)
    }

    pub fn clear_histories(&mut self) {
        self.combiner.clear_histories();
    }

    /// One tick: deliver queued events, then sample and merge every source
    pub fn update(&mut self) {
        if !self.is_open {
            debug!("Combiner {} not open, skipping update", self.serial);
            return;
        }

        self.events.drain(self.delegate.as_deref_mut());

        let head_mounted_origin = self
            .sources
            .iter()
            .find(|source| source.options().tracking_mode == TrackingMode::HeadMounted)
            .map(|source| source.device_origin().translation.vector);
        let to_desktop = head_mounted_rotation().inverse();

        let frames: Vec<SourceFrame> = self
            .sources
            .iter()
            .map(|source| {
                let options = source.options();
                let origin = source.device_origin();
                let frame = if options.is_head_mounted() {
                    let mut frame = source.latest_frame(false);
                    frame.transform(&origin.translation.vector, &to_desktop);
                    frame
                } else {
                    source.latest_frame(true)
                };
                SourceFrame {
                    device: DeviceDescriptor::new(source.serial(), source.device_type(), origin),
                    options,
                    frame,
                }
            })
            .collect();

        let mut merged = self.combiner.combine_frame(&frames);

        if let Some(origin) = head_mounted_origin {
            let to_head_mounted = head_mounted_rotation();
            let offset: Vector3<f32> = -(to_head_mounted * origin);
            merged.transform(&offset, &to_head_mounted);
        }

        self.previous_frame = self.current_frame.replace(merged);
    }
}

impl HandTrackingWrapper for DeviceCombiner {
    fn open_connection(&mut self, delegate: Option<Box<dyn CallbackDelegate>>) -> bool {
        if self.is_open {
            warn!("Combiner {} already open", self.serial);
            return true;
        }
        self.delegate = delegate;
        self.events.resume();
        self.is_open = true;
        info!("Combiner {} connection opened", self.serial);
        true
    }

    fn close_connection(&mut self) {
        if !self.is_open {
            warn!("Combiner {} connection already closed", self.serial);
            return;
        }

        self.events.stop();
        self.events.wait_idle(self.close_timeout);
        self.delegate = None;
        self.events.discard_pending();
        self.is_open = false;
        info!("Combiner {} connection successfully closed", self.serial);
    }

    fn set_callback_delegate(&mut self, delegate: Option<Box<dyn CallbackDelegate>>) {
        self.delegate = delegate;
    }

    fn set_policy(&mut self, set_flags: u64, clear_flags: u64) {
        if let Some(connector) = &self.connector {
            connector.set_policy(set_flags, clear_flags, self.device_id);
        }
    }

    fn set_tracking_mode(&mut self, mode: TrackingMode) {
        if let Some(connector) = &self.connector {
            connector.set_tracking_mode(mode, self.device_id);
        }
    }

    fn get_frame(&self) -> Option<FrameSnapshot> {
        self.current_frame.clone()
    }

    fn get_interpolated_frame_at_time(&self, timestamp_us: i64) -> Option<FrameSnapshot> {
        let current = self.current_frame.as_ref()?;
        match &self.previous_frame {
            Some(previous) => Some(interpolate_frames(previous, current, timestamp_us)),
            None => Some(current.clone()),
        }
    }

    fn get_device_properties(&self) -> DeviceProperties {
        self.properties
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn enable_image_stream(&mut self, _enable: bool) {}

    fn get_now(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }

    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn device_serial(&self) -> String {
        self.serial.clone()
    }

    fn match_devices(&self, serials: &[String], class: CombinerClass) -> bool {
        if class != self.class {
            return false;
        }
        let requested: HashSet<&str> = serials.iter().map(String::as_str).collect();
        let own = self.source_serials();
        let own: HashSet<&str> = own.iter().map(String::as_str).collect();
        requested == own
    }

    fn contains_device(&self, serial: &str) -> bool {
        self.sources.iter().any(|source| source.serial() == serial)
    }
}

/// A shared combiner can itself be a source of another combiner
impl TrackingDevice for Mutex<DeviceCombiner> {
    fn serial(&self) -> String {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .serial
            .clone()
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Combined
    }

    fn device_origin(&self) -> Isometry3<f32> {
        Isometry3::identity()
    }

    fn options(&self) -> DeviceOptions {
        DeviceOptions::default()
    }

    fn latest_frame(&self, _apply_device_origin: bool) -> FrameSnapshot {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .current_frame
            .clone()
            .unwrap_or_default()
    }
}

// ==============================================================================
// Registry
// ==============================================================================

/// Owns every combined device and reuses one when the same devices and class
/// are requested again
pub struct CombinerRegistry {
    config: FusionConfig,
    ids: CombinerIdGenerator,
    connector: Option<Arc<dyn ServiceConnector>>,
    combiners: Vec<DeviceCombiner>,
}

impl CombinerRegistry {
    pub fn new(config: FusionConfig, connector: Option<Arc<dyn ServiceConnector>>) -> Self {
        Self {
            config,
            ids: CombinerIdGenerator::new(),
            connector,
            combiners: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.combiners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combiners.is_empty()
    }

    pub fn combiners_mut(&mut self) -> impl Iterator<Item = &mut DeviceCombiner> {
        self.combiners.iter_mut()
    }

    pub fn find(&self, serials: &[String], class: CombinerClass) -> Option<&DeviceCombiner> {
        self.combiners
            .iter()
            .find(|combiner| combiner.match_devices(serials, class))
    }

    /// Existing combiner over exactly these devices, or a new one built from `available`
    pub fn find_or_create(
        &mut self,
        serials: &[String],
        class: CombinerClass,
        available: &[Arc<dyn TrackingDevice>],
    ) -> FusionResult<&mut DeviceCombiner> {
        if let Some(index) = self
            .combiners
            .iter()
            .position(|combiner| combiner.match_devices(serials, class))
        {
            return Ok(&mut self.combiners[index]);
        }

        let mut sources = Vec::with_capacity(serials.len());
        for serial in serials {
            let device = available
                .iter()
                .find(|device| &device.serial() == serial)
                .ok_or_else(|| FusionError::UnknownDevice(serial.clone()))?;
            sources.push(device.clone());
        }

        let combiner =
            DeviceCombiner::new(sources, class, &self.config, &self.ids, self.connector.clone())?;
        self.combiners.push(combiner);
        let index = self.combiners.len() - 1;
        Ok(&mut self.combiners[index])
    }

    /// Close and drop the combiner over these devices. Returns false if none matched.
    pub fn close(&mut self, serials: &[String], class: CombinerClass) -> bool {
        let Some(index) = self
            .combiners
            .iter()
            .position(|combiner| combiner.match_devices(serials, class))
        else {
            return false;
        };
        let mut combiner = self.combiners.remove(index);
        if combiner.is_open() {
            combiner.close_connection();
        }
        true
    }

    /// Tick every open combiner
    pub fn update_all(&mut self) {
        for combiner in self.combiners.iter_mut() {
            combiner.update();
        }
    }
}
