use std::time::Instant;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Result of asking the swapchain for the next image
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired {
        image_index: u32,
        suboptimal: bool,
    },
    OutOfDate,
}

impl AcquireOutcome {
    pub fn from_vk(result: VkResult<(u32, bool)>) -> Result<Self> {
        match result {
            Ok((image_index, suboptimal)) => Ok(Self::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }
}

/// Result of queueing an image for presentation
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn from_vk(result: VkResult<bool>) -> Result<Self> {
        match result {
            Ok(false) => Ok(Self::Presented),
            Ok(true) => Ok(Self::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }
}

/// Which slot primitives a submission waits on and signals
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub image_index: u32,
    pub wait_image_available: usize,
    pub signal_render_finished: usize,
    pub signal_fence: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PresentRequest {
    pub image_index: u32,
    pub wait_render_finished: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Drawn {
        image_index: u32,
        slot: usize,
    },
    Skipped,
}

/// Device operations the frame loop drives. Slots index the per-frame
/// semaphores and fences, images index the swapchain.
pub trait FrameBackend {
    /// Images in the current swapchain, zero while there is none
    fn image_count(&self) -> usize;

    /// Blocks until the fence of `slot` is signaled
    fn wait_for_fence(&mut self, slot: usize) -> Result<()>;

    /// Acquires the next image, signaling the "image available" semaphore of `slot`
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    fn update_uniforms(&mut self, slot: usize, elapsed_secs: f32) -> Result<()>;

    /// Re-records the command buffer of `image_index` with the resources of `slot`
    fn record_commands(&mut self, image_index: u32, slot: usize) -> Result<()>;

    /// Resets the fence being signaled, then submits the image's command buffer
    fn submit(&mut self, request: &SubmitRequest) -> Result<()>;

    fn present(&mut self, request: &PresentRequest) -> Result<PresentOutcome>;

    /// Waits for the device to go idle and rebuilds every swapchain-derived object
    fn recreate_swapchain(&mut self) -> Result<()>;
}

/// Frames-in-flight bookkeeping: which slot is next, which slot last used each
/// swapchain image, and whether the swapchain must be rebuilt
pub struct FrameLoop {
    frames_in_flight: usize,
    current_slot: usize,
    images_in_flight: Vec<Option<usize>>,
    resize_requested: bool,
    start_time: Instant,
}

impl FrameLoop {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current_slot: 0,
            images_in_flight: vec![None; image_count],
            resize_requested: false,
            start_time: Instant::now(),
        }
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn tick<B: FrameBackend>(&mut self, backend: &mut B) -> Result<TickOutcome> {
        let elapsed_secs = self.start_time.elapsed().as_secs_f32();
        self.tick_at(backend, elapsed_secs)
    }

    pub fn tick_at<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        elapsed_secs: f32,
    ) -> Result<TickOutcome> {
        // A previous rebuild may have been skipped while the window had no area
        if backend.image_count() == 0 {
            self.recreate(backend)?;
            if backend.image_count() == 0 {
                return Ok(TickOutcome::Skipped);
            }
        }

        let slot = self.current_slot;
        backend.wait_for_fence(slot)?;

        let (image_index, suboptimal) = match backend.acquire_next_image(slot)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date on acquire");
                self.recreate(backend)?;
                return Ok(TickOutcome::Skipped);
            }
        };

        let tracked = self.images_in_flight
            .get_mut(image_index as usize)
            .ok_or_else(|| eyre!("Acquired image {} is not part of the swapchain", image_index))?;
        if let Some(owner) = tracked.replace(slot) {
            if owner != slot {
                backend.wait_for_fence(owner)?;
            }
        }

        backend.update_uniforms(slot, elapsed_secs)?;
        backend.record_commands(image_index, slot)?;
        backend.submit(&SubmitRequest {
            image_index,
            wait_image_available: slot,
            signal_render_finished: slot,
            signal_fence: slot,
        })?;
        let presented = backend.present(&PresentRequest {
            image_index,
            wait_render_finished: slot,
        })?;

        if suboptimal || presented != PresentOutcome::Presented || self.resize_requested {
            log::debug!(
                "Rebuilding swapchain (suboptimal acquire: {}, present: {:?}, resize: {})",
                suboptimal,
                presented,
                self.resize_requested,
            );
            self.recreate(backend)?;
        }

        self.current_slot = (slot + 1) % self.frames_in_flight;
        Ok(TickOutcome::Drawn {
            image_index,
            slot,
        })
    }

    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        backend.recreate_swapchain()?;
        self.images_in_flight = vec![None; backend.image_count()];
        self.resize_requested = false;
        Ok(())
    }
}
