//! The Wayland session: one xdg toplevel plus both buffer allocators

use crate::error::WaylandError;
use crate::fence::DmaBufFence;
use crate::mapping::{create_memfd, MappedRegion};
use crate::state::State;
use fillbench_core::{
    AllocError, Allocation, Allocator, BufferHandle, Damage, Session, SessionError, SessionEvent,
    Strategy,
};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use wayland_client::globals::{registry_queue_init, GlobalList};
use wayland_client::protocol::{wl_buffer, wl_compositor, wl_shm, wl_surface};
use wayland_client::{Connection, EventQueue, Proxy, QueueHandle};
use wayland_protocols::wp::linux_dmabuf::zv1::client::{
    zwp_linux_buffer_params_v1, zwp_linux_dmabuf_v1,
};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

/// `DRM_FORMAT_ARGB8888`, fourcc `AR24`.
pub const DRM_FORMAT_ARGB8888: u32 = u32::from_le_bytes(*b"AR24");

/// `DRM_FORMAT_MOD_LINEAR`
const MODIFIER_LINEAR: u64 = 0;

/// Used when the compositor does not name its device.
pub const DEFAULT_RENDER_NODE: &str = "/dev/dri/renderD128";

#[derive(Debug, Clone)]
pub struct WaylandConfig {
    pub scale: u32,
    /// Overrides the render node the compositor advertises.
    pub drm_device: Option<PathBuf>,
    pub title: String,
}

impl Default for WaylandConfig {
    fn default() -> Self {
        Self {
            scale: 1,
            drm_device: None,
            title: "fillbench".to_string(),
        }
    }
}

struct Globals {
    compositor: wl_compositor::WlCompositor,
    shm: wl_shm::WlShm,
    wm_base: xdg_wm_base::XdgWmBase,
    dmabuf: Option<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1>,
}

impl Globals {
    fn bind(list: &GlobalList, qh: &QueueHandle<State>) -> Result<Self, WaylandError> {
        let missing = |interface| move |source| WaylandError::MissingGlobal { interface, source };

        let compositor = list
            .bind(qh, 3..=3, ())
            .map_err(missing("wl_compositor"))?;
        let shm = list.bind(qh, 1..=1, ()).map_err(missing("wl_shm"))?;
        let wm_base = list.bind(qh, 1..=1, ()).map_err(missing("xdg_wm_base"))?;
        let dmabuf = match list.bind(qh, 3..=4, ()) {
            Ok(dmabuf) => Some(dmabuf),
            Err(err) => {
                tracing::warn!(%err, "zwp_linux_dmabuf_v1 unavailable; GPU-shared buffers disabled");
                None
            }
        };

        Ok(Self {
            compositor,
            shm,
            wm_base,
            dmabuf,
        })
    }
}

pub struct WaylandSession {
    conn: Connection,
    queue: EventQueue<State>,
    qh: QueueHandle<State>,
    state: State,
    globals: Globals,
    surface: wl_surface::WlSurface,
    xdg_surface: xdg_surface::XdgSurface,
    toplevel: xdg_toplevel::XdgToplevel,
    buffers: HashMap<BufferHandle, wl_buffer::WlBuffer>,
    drm_device: PathBuf,
    buffer_objects: Vec<gbm::BufferObject<()>>,
    gbm: Option<gbm::Device<File>>,
}

impl WaylandSession {
    /// Connect from the environment and map a configured toplevel.
    pub fn connect(config: &WaylandConfig) -> Result<Self, WaylandError> {
        let conn = Connection::connect_to_env()?;
        let (list, mut queue) = registry_queue_init::<State>(&conn)?;
        let qh = queue.handle();
        let globals = Globals::bind(&list, &qh)?;

        let surface = globals.compositor.create_surface(&qh, ());
        let xdg_surface = globals.wm_base.get_xdg_surface(&surface, &qh, ());
        let toplevel = xdg_surface.get_toplevel(&qh, ());
        toplevel.set_title(config.title.clone());
        surface.set_buffer_scale(i32::try_from(config.scale).unwrap_or(1));
        surface.attach(None, 0, 0);
        surface.commit();

        let mut state = State::default();
        while !state.configured {
            if state.closed {
                return Err(WaylandError::ClosedBeforeConfigure);
            }
            queue.blocking_dispatch(&mut state)?;
        }
        state.events.retain(|event| *event != SessionEvent::Configured);
        tracing::info!(scale = config.scale, "surface configured");

        let advertised = match &globals.dmabuf {
            Some(dmabuf) if dmabuf.version() >= 4 => {
                let feedback = dmabuf.get_default_feedback(&qh, ());
                queue.roundtrip(&mut state)?;
                feedback.destroy();
                state.main_device.take()
            }
            _ => None,
        };
        let drm_device = select_render_node(config.drm_device.as_deref(), advertised.as_deref());
        tracing::info!(path = %drm_device.display(), "using DRM render node");

        Ok(Self {
            conn,
            queue,
            qh,
            state,
            globals,
            surface,
            xdg_surface,
            toplevel,
            buffers: HashMap::new(),
            drm_device,
            buffer_objects: Vec::new(),
            gbm: None,
        })
    }

    fn gbm_device(&mut self) -> Result<&gbm::Device<File>, AllocError> {
        if self.gbm.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.drm_device)
                .map_err(|source| AllocError::Os {
                    op: "open DRM render node",
                    source,
                })?;
            let device = gbm::Device::new(file).map_err(|source| AllocError::Os {
                op: "gbm_create_device",
                source,
            })?;
            tracing::debug!(path = %self.drm_device.display(), "opened GBM device");
            self.gbm = Some(device);
        }
        self.gbm.as_ref().ok_or(AllocError::Unsupported {
            strategy: Strategy::GpuShared,
        })
    }

    fn allocate_shm(
        &mut self,
        handle: BufferHandle,
        width: u32,
        height: u32,
    ) -> Result<Allocation, AllocError> {
        let layout = layout(width, height)?;
        let fd = create_memfd(c"fillbench-shm", layout.len)?;

        let pool = self
            .globals
            .shm
            .create_pool(fd.as_fd(), layout.len_i32, &self.qh, ());
        let buffer = pool.create_buffer(
            0,
            layout.width,
            layout.height,
            layout.stride_i32,
            wl_shm::Format::Argb8888,
            &self.qh,
            handle,
        );
        pool.destroy();

        let region = MappedRegion::map(fd, layout.len)?;
        self.buffers.insert(handle, buffer);
        tracing::debug!(%handle, width, height, stride = layout.stride, "allocated shm buffer");

        Ok(Allocation {
            stride: layout.stride,
            memory: Box::new(region),
            fence: None,
        })
    }

    fn allocate_dmabuf(
        &mut self,
        handle: BufferHandle,
        width: u32,
        height: u32,
    ) -> Result<Allocation, AllocError> {
        let dmabuf = self.globals.dmabuf.clone().ok_or(AllocError::Unsupported {
            strategy: Strategy::GpuShared,
        })?;

        let bo = self
            .gbm_device()?
            .create_buffer_object::<()>(
                width,
                height,
                gbm::Format::Argb8888,
                gbm::BufferObjectFlags::LINEAR | gbm::BufferObjectFlags::RENDERING,
            )
            .map_err(|source| AllocError::Os {
                op: "gbm_bo_create",
                source,
            })?;
        let stride = bo.stride();
        let fd = bo.fd().map_err(|err| AllocError::Protocol {
            op: "gbm_bo_get_fd",
            reason: err.to_string(),
        })?;
        let fence_fd = fd.try_clone().map_err(|source| AllocError::Os {
            op: "dup DMA-BUF fd",
            source,
        })?;

        let len = stride as usize * height as usize;
        let layout = layout(width, height)?;
        let params = dmabuf.create_params(&self.qh, handle);
        params.add(
            fd.as_fd(),
            0,
            0,
            stride,
            (MODIFIER_LINEAR >> 32) as u32,
            (MODIFIER_LINEAR & 0xffff_ffff) as u32,
        );
        let buffer = params.create_immed(
            layout.width,
            layout.height,
            DRM_FORMAT_ARGB8888,
            zwp_linux_buffer_params_v1::Flags::empty(),
            &self.qh,
            handle,
        );
        params.destroy();

        // Import failures arrive asynchronously.
        self.queue
            .roundtrip(&mut self.state)
            .map_err(|err| AllocError::Protocol {
                op: "roundtrip",
                reason: err.to_string(),
            })?;
        if self.state.import_failures.contains(&handle) {
            buffer.destroy();
            return Err(AllocError::Protocol {
                op: "zwp_linux_buffer_params_v1.create_immed",
                reason: format!("compositor rejected {handle}"),
            });
        }

        let region = MappedRegion::map(fd, len)?;
        self.buffers.insert(handle, buffer);
        self.buffer_objects.push(bo);
        tracing::debug!(%handle, width, height, stride, "allocated dmabuf buffer");

        Ok(Allocation {
            stride,
            memory: Box::new(region),
            fence: Some(Box::new(DmaBufFence::new(fence_fd))),
        })
    }

    fn flush(&self) -> Result<(), SessionError> {
        self.conn
            .flush()
            .map_err(|err| SessionError::connection("flush", err))
    }
}

/// Configured node first, then the one behind the compositor's main
/// device, then the first render node.
fn select_render_node(configured: Option<&Path>, main_device: Option<&[u8]>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    main_device
        .and_then(parse_dev_t)
        .and_then(|dev| {
            let node = render_node(dev);
            if node.is_none() {
                tracing::debug!(dev, "no render node for compositor device");
            }
            node
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDER_NODE))
}

fn parse_dev_t(bytes: &[u8]) -> Option<libc::dev_t> {
    <[u8; 8]>::try_from(bytes).ok().map(libc::dev_t::from_ne_bytes)
}

/// Render node of the DRM device `dev`, which may itself be a primary node.
fn render_node(dev: libc::dev_t) -> Option<PathBuf> {
    let dir = format!(
        "/sys/dev/char/{}:{}/device/drm",
        libc::major(dev),
        libc::minor(dev)
    );
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.file_name())
        .find(|name| name.to_string_lossy().starts_with("renderD"))
        .map(|name| Path::new("/dev/dri").join(name))
}

struct Layout {
    width: i32,
    height: i32,
    stride: u32,
    stride_i32: i32,
    len: usize,
    len_i32: i32,
}

/// Protocol-sized dimensions of a tightly packed ARGB8888 buffer.
fn layout(width: u32, height: u32) -> Result<Layout, AllocError> {
    let overflow = || AllocError::Layout {
        width,
        height,
        stride: 0,
        len: 0,
    };

    let stride = width.checked_mul(4).ok_or_else(overflow)?;
    let len = (stride as usize)
        .checked_mul(height as usize)
        .ok_or_else(overflow)?;
    Ok(Layout {
        width: i32::try_from(width).map_err(|_| overflow())?,
        height: i32::try_from(height).map_err(|_| overflow())?,
        stride,
        stride_i32: i32::try_from(stride).map_err(|_| overflow())?,
        len,
        len_i32: i32::try_from(len).map_err(|_| overflow())?,
    })
}

impl Allocator for WaylandSession {
    fn allocate(
        &mut self,
        handle: BufferHandle,
        width: u32,
        height: u32,
    ) -> Result<Allocation, AllocError> {
        match handle.strategy {
            Strategy::HostMemory => self.allocate_shm(handle, width, height),
            Strategy::GpuShared => self.allocate_dmabuf(handle, width, height),
        }
    }
}

impl Session for WaylandSession {
    fn request_frame(&mut self, buffer: BufferHandle) -> Result<(), SessionError> {
        self.surface.frame(&self.qh, buffer);
        Ok(())
    }

    fn submit(&mut self, buffer: BufferHandle, damage: Damage) -> Result<(), SessionError> {
        let wl_buffer = self
            .buffers
            .get(&buffer)
            .ok_or(SessionError::UnknownBuffer(buffer))?;

        self.surface.attach(Some(wl_buffer), 0, 0);
        self.surface
            .damage(damage.x, damage.y, damage.width, damage.height);
        self.surface.commit();
        self.flush()
    }

    fn dispatch(&mut self, events: &mut Vec<SessionEvent>) -> Result<(), SessionError> {
        if self.state.events.is_empty() {
            self.queue
                .blocking_dispatch(&mut self.state)
                .map_err(|err| SessionError::connection("dispatch", err))?;
        }
        events.append(&mut self.state.events);
        Ok(())
    }
}

impl Drop for WaylandSession {
    fn drop(&mut self) {
        for buffer in self.buffers.values() {
            buffer.destroy();
        }
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
        if let Err(err) = self.conn.flush() {
            tracing::debug!(%err, "flush on teardown failed");
        }
        tracing::debug!(surface = %self.surface.id(), "wayland session closed");
    }
}
