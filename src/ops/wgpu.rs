//! GPU-accelerated matrix kernels using WGPU.
//!
//! This module owns the GPU context, the WGSL shaders and the compute
//! pipelines, and implements the two kernel families:
//!
//! - `elementwise` — add / subtract / Hadamard product
//! - `matmul` — row-by-column matrix product
//!
//! The launch geometry decides the workgroup size, which WGSL only accepts as
//! a pipeline constant. Pipelines are therefore compiled lazily per
//! `(kernel, group size)` and cached for the lifetime of the process.
//!
//! Device memory is never held across calls. Each operand is uploaded into a
//! [`DeviceMirror`] at the start of the call, the output is read back into
//! host memory, and every mirror is destroyed when it goes out of scope, on
//! the success path and on every error path alike.

use super::ElementwiseOp;
use crate::geometry::{Geometry, compute_geometry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use wgpu::util::DeviceExt;

const ELEMENTWISE: &str = include_str!("shaders/elementwise.wgsl");
const MATMUL: &str = include_str!("shaders/matmul.wgsl");

/// Basic wrapper for common GPU errors.
#[derive(Debug)]
pub enum GpuError {
    /// An error in requesting the adapter.
    Adapter(wgpu::RequestAdapterError),
    /// An error in requesting the GPU (device).
    Device(wgpu::RequestDeviceError),
}

impl core::fmt::Display for GpuError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Adapter(e) => write!(f, "Adapter error: {e}"),
            Self::Device(e) => write!(f, "Device error: {e}"),
        }
    }
}

/// A type of error closely related to the GPU.
#[derive(Debug)]
pub struct GpuFailure {
    /// The optional type of failure that occurred.
    pub kind: Option<GpuError>,
    /// The optional message explaining the failure.
    pub message: Option<String>,
}

impl GpuFailure {
    fn other(msg: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: Some(msg.into()),
        }
    }
}

impl From<GpuError> for GpuFailure {
    fn from(kind: GpuError) -> Self {
        Self {
            kind: Some(kind),
            message: None,
        }
    }
}

impl From<wgpu::PollError> for GpuFailure {
    fn from(err: wgpu::PollError) -> Self {
        Self::other(format!("poll failed: {err}"))
    }
}

impl From<wgpu::BufferAsyncError> for GpuFailure {
    fn from(err: wgpu::BufferAsyncError) -> Self {
        Self::other(format!("buffer mapping failed: {err}"))
    }
}

impl core::fmt::Display for GpuFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if let Some(kind) = &self.kind {
            write!(f, "GPU failure: {kind}")
        } else if let Some(msg) = &self.message {
            write!(f, "GPU failure: {msg}")
        } else {
            write!(f, "Unknown GPU failure")
        }
    }
}

impl core::error::Error for GpuFailure {}

/// Holds the WGPU device and queue used for executing compute pipelines.
///
/// Initialized once globally and reused for all operations via `lazy_static`.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// A queue for information related to the device.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Initializes a new GPU context, selecting the default adapter and
    /// creating a device + queue.
    ///
    /// # Errors
    ///
    /// Returns `Err(GpuError)` if adapter or device acquisition fails.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(GpuError::Adapter)?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("gridnet"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        log::info!(target: "gridnet::wgpu", "GPU context ready on {:?}", adapter.get_info().name);
        Ok(Self { device, queue })
    }

    /// The largest number of invocations one workgroup may hold on this device.
    #[must_use]
    pub fn max_group_size(&self) -> u32 {
        let limits = self.device.limits();
        limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x)
            .min(limits.max_compute_workgroup_size_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kernel {
    Elementwise,
    Matmul,
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            log::error!(target: "gridnet::wgpu", "failed to initialize GPU context: {err}");
            None
        }
    };
    static ref ELEMENTWISE_SHADER: Option<wgpu::ShaderModule> =
        GPU_CONTEXT.as_ref().map(|ctx| load_shader(&ctx.device, "elementwise", ELEMENTWISE));
    static ref MATMUL_SHADER: Option<wgpu::ShaderModule> =
        GPU_CONTEXT.as_ref().map(|ctx| load_shader(&ctx.device, "matmul", MATMUL));
    // uniform params, two read-only operands, one output; both kernels share it
    static ref BINARY_BIND_GROUP_LAYOUT: Option<wgpu::BindGroupLayout> =
        GPU_CONTEXT.as_ref().map(|ctx| {
            ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("binary_bgl"),
                entries: &[
                    buffer_entry(0, wgpu::BufferBindingType::Uniform),
                    buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                    buffer_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                    buffer_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
                ],
            })
        });
    static ref BINARY_PIPELINE_LAYOUT: Option<wgpu::PipelineLayout> =
        GPU_CONTEXT.as_ref().zip(BINARY_BIND_GROUP_LAYOUT.as_ref()).map(|(ctx, bgl)| {
            ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("binary_pipeline_layout"),
                bind_group_layouts: &[bgl],
                push_constant_ranges: &[],
            })
        });
    static ref PIPELINES: Mutex<HashMap<(Kernel, u32, u32), Arc<wgpu::ComputePipeline>>> =
        Mutex::new(HashMap::new());
}

const fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn load_shader(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

fn context() -> Result<&'static GpuContext, GpuFailure> {
    GPU_CONTEXT
        .as_ref()
        .ok_or_else(|| GpuFailure::other("no GPU context available"))
}

/// Returns the cached pipeline for `kernel` with the workgroup size of `geometry`.
fn pipeline(
    ctx: &GpuContext,
    kernel: Kernel,
    geometry: &Geometry,
) -> Result<Arc<wgpu::ComputePipeline>, GpuFailure> {
    let size = geometry.group_size;
    let key = (kernel, size.x, size.y);

    let mut cache = PIPELINES
        .lock()
        .map_err(|_| GpuFailure::other("pipeline cache poisoned"))?;
    if let Some(found) = cache.get(&key) {
        return Ok(Arc::clone(found));
    }

    let (module, label) = match kernel {
        Kernel::Elementwise => (ELEMENTWISE_SHADER.as_ref(), "elementwise_pipeline"),
        Kernel::Matmul => (MATMUL_SHADER.as_ref(), "matmul_pipeline"),
    };
    let module = module.ok_or_else(|| GpuFailure::other("shader unavailable"))?;
    let layout = BINARY_PIPELINE_LAYOUT
        .as_ref()
        .ok_or_else(|| GpuFailure::other("pipeline layout unavailable"))?;

    let constants = [("group_x", f64::from(size.x)), ("group_y", f64::from(size.y))];
    let built = Arc::new(ctx.device.create_compute_pipeline(
        &wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            module,
            entry_point: Some("main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
        },
    ));
    log::debug!(target: "gridnet::wgpu", "compiled {label} for group {size}");

    cache.insert(key, Arc::clone(&built));
    Ok(built)
}

/// A device-resident copy of host data, alive for one kernel call.
///
/// Creating a mirror is the "start operation" half of a kernel call;
/// dropping it is the "end operation" half and destroys the buffer.
pub struct DeviceMirror {
    buffer: wgpu::Buffer,
    size: u64,
    label: &'static str,
}

impl DeviceMirror {
    /// Uploads `bytes` into a new buffer with the given usage.
    fn upload(
        ctx: &GpuContext,
        label: &'static str,
        bytes: &[u8],
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytes,
                usage,
            });
        log::trace!(target: "gridnet::wgpu", "start_operation {label} ({} bytes)", bytes.len());
        Self {
            buffer,
            size: bytes.len() as u64,
            label,
        }
    }

    /// Allocates an output buffer holding `len` floats.
    fn output(ctx: &GpuContext, label: &'static str, len: usize) -> Self {
        let size = (len * size_of::<f32>()) as u64;
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        log::trace!(target: "gridnet::wgpu", "start_operation {label} ({size} bytes)");
        Self { buffer, size, label }
    }

    /// Copies the device contents back into `out`, blocking until done.
    fn read_back(&self, ctx: &GpuContext, out: &mut [f32]) -> Result<(), GpuFailure> {
        let staging = Self {
            buffer: ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("staging"),
                size: self.size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            size: self.size,
            label: "staging",
        };

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read_back_encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging.buffer, 0, self.size);
        ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::PollType::Wait)?;
        rx.recv()
            .map_err(|_| GpuFailure::other("mapping callback never ran"))??;

        {
            let view = slice.get_mapped_range();
            let floats: &[f32] = bytemuck::try_cast_slice::<u8, f32>(&view)
                .map_err(|e| GpuFailure::other(format!("bad read-back buffer: {e}")))?;
            out.copy_from_slice(floats);
        }
        staging.buffer.unmap();
        Ok(())
    }
}

impl Drop for DeviceMirror {
    fn drop(&mut self) {
        self.buffer.destroy();
        log::trace!(target: "gridnet::wgpu", "end_operation {}", self.label);
    }
}

/// Encodes one dispatch of `kernel` over `geometry` and waits for it.
fn launch(
    ctx: &GpuContext,
    kernel: Kernel,
    geometry: &Geometry,
    params: &DeviceMirror,
    lhs: &DeviceMirror,
    rhs: &DeviceMirror,
    out: &DeviceMirror,
) -> Result<(), GpuFailure> {
    let max_groups = ctx.device.limits().max_compute_workgroups_per_dimension;
    if geometry.group_count.x > max_groups || geometry.group_count.y > max_groups {
        return Err(GpuFailure::other(format!(
            "grid {} exceeds {max_groups} groups per dimension",
            geometry.group_count
        )));
    }

    let pipeline = pipeline(ctx, kernel, geometry)?;
    let layout = BINARY_BIND_GROUP_LAYOUT
        .as_ref()
        .ok_or_else(|| GpuFailure::other("bind group layout unavailable"))?;

    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("binary_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params.buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: lhs.buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: rhs.buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: out.buffer.as_entire_binding(),
            },
        ],
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kernel_encoder"),
        });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("kernel_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(geometry.group_count.x, geometry.group_count.y, 1);
    }
    ctx.queue.submit(Some(encoder.finish()));
    log::trace!(target: "gridnet::wgpu", "launched {kernel:?} with {geometry}");
    Ok(())
}

fn dims(a: usize, b: usize, c: usize, d: usize) -> Result<[u32; 4], GpuFailure> {
    let cast = |v: usize| {
        u32::try_from(v).map_err(|_| GpuFailure::other(format!("dimension {v} exceeds u32")))
    };
    Ok([cast(a)?, cast(b)?, cast(c)?, cast(d)?])
}

/// Element-wise `lhs ∘ rhs` on the GPU over a `rows × cols` matrix.
///
/// # Errors
///
/// Fails when no GPU is available or the dispatch / read-back fails.
pub fn elementwise(
    op: ElementwiseOp,
    lhs: &[f32],
    rhs: &[f32],
    rows: usize,
    cols: usize,
) -> Result<Vec<f32>, GpuFailure> {
    let mut out = vec![0.0; rows * cols];
    if out.is_empty() {
        return Ok(out);
    }
    let ctx = context()?;
    let geometry = compute_geometry(rows, cols, ctx.max_group_size());

    let params = dims(rows, cols, op as usize, 0)?;
    let params = DeviceMirror::upload(
        ctx,
        "params",
        bytemuck::cast_slice(&params),
        wgpu::BufferUsages::UNIFORM,
    );
    let lhs = DeviceMirror::upload(
        ctx,
        "lhs",
        bytemuck::cast_slice(lhs),
        wgpu::BufferUsages::STORAGE,
    );
    let rhs = DeviceMirror::upload(
        ctx,
        "rhs",
        bytemuck::cast_slice(rhs),
        wgpu::BufferUsages::STORAGE,
    );
    let result = DeviceMirror::output(ctx, "out", out.len());

    launch(ctx, Kernel::Elementwise, &geometry, &params, &lhs, &rhs, &result)?;
    result.read_back(ctx, &mut out)?;
    Ok(out)
}

/// Row-by-column product `lhs (m×k) · rhs (k×n)` on the GPU.
///
/// # Errors
///
/// Fails when no GPU is available or the dispatch / read-back fails.
pub fn matmul(
    lhs: &[f32],
    rhs: &[f32],
    m: usize,
    k: usize,
    n: usize,
) -> Result<Vec<f32>, GpuFailure> {
    let mut out = vec![0.0; m * n];
    // an empty contraction leaves the zeros; empty storage bindings are invalid
    if out.is_empty() || k == 0 {
        return Ok(out);
    }
    let ctx = context()?;
    let geometry = compute_geometry(m, n, ctx.max_group_size());

    let params = dims(m, k, n, 0)?;
    let params = DeviceMirror::upload(
        ctx,
        "dims",
        bytemuck::cast_slice(&params),
        wgpu::BufferUsages::UNIFORM,
    );
    let lhs = DeviceMirror::upload(
        ctx,
        "A",
        bytemuck::cast_slice(lhs),
        wgpu::BufferUsages::STORAGE,
    );
    let rhs = DeviceMirror::upload(
        ctx,
        "B",
        bytemuck::cast_slice(rhs),
        wgpu::BufferUsages::STORAGE,
    );
    let result = DeviceMirror::output(ctx, "C", out.len());

    launch(ctx, Kernel::Matmul, &geometry, &params, &lhs, &rhs, &result)?;
    result.read_back(ctx, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::approx_eq;
    use crate::ops::cpu;

    fn ramp(len: usize, step: f32) -> Vec<f32> {
        (0..len).map(|i| (i % 13) as f32 * step - 3.0).collect()
    }

    fn gpu_available() -> bool {
        if context().is_err() {
            eprintln!("no GPU adapter, skipping");
            return false;
        }
        true
    }

    #[test]
    fn wgpu_elementwise_matches_cpu() {
        if !gpu_available() {
            return;
        }
        // one 3x5 group, then a 37x29 matrix tiled over many groups
        for (rows, cols) in [(3, 5), (37, 29)] {
            let a = ramp(rows * cols, 0.5);
            let b = ramp(rows * cols, -0.25);
            let geometry = compute_geometry(rows, cols, context().unwrap().max_group_size());
            for op in [ElementwiseOp::Add, ElementwiseOp::Sub, ElementwiseOp::Mul] {
                let gpu = elementwise(op, &a, &b, rows, cols).expect("elementwise failed");
                let expected = cpu::elementwise(op, &a, &b, rows, cols, &geometry);
                assert_eq!(gpu.len(), rows * cols);
                assert!(approx_eq(gpu.as_slice(), expected.as_slice()), "{op:?} {rows}x{cols}");
            }
        }
    }

    #[test]
    fn wgpu_sub_of_self_is_zero() {
        if !gpu_available() {
            return;
        }
        let a = ramp(37 * 29, 1.5);
        let out = elementwise(ElementwiseOp::Sub, &a, &a, 37, 29).expect("sub failed");
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn wgpu_matmul_matches_cpu() {
        if !gpu_available() {
            return;
        }
        for (m, k, n) in [(3, 4, 5), (37, 5, 29)] {
            let a = ramp(m * k, 0.5);
            let b = ramp(k * n, 0.75);
            let geometry = compute_geometry(m, n, context().unwrap().max_group_size());
            let gpu = matmul(&a, &b, m, k, n).expect("matmul failed");
            let expected = cpu::matmul(&a, &b, m, k, n, &geometry);
            assert_eq!(gpu.len(), m * n);
            assert!(approx_eq(gpu.as_slice(), expected.as_slice()), "{m}x{k} * {k}x{n}");
        }
    }

    #[test]
    fn empty_shapes_skip_the_device() {
        // these return before touching the context, GPU or not
        assert!(elementwise(ElementwiseOp::Add, &[], &[], 0, 4).unwrap().is_empty());
        assert!(matmul(&[], &[], 0, 3, 2).unwrap().is_empty());
        assert_eq!(matmul(&[], &[], 2, 0, 3).unwrap(), vec![0.0; 6]);
    }

    #[test]
    fn pipelines_are_cached_per_group_size() {
        if !gpu_available() {
            return;
        }
        let ctx = context().unwrap();
        let geometry = compute_geometry(3, 5, ctx.max_group_size());
        let first = pipeline(ctx, Kernel::Matmul, &geometry).unwrap();
        let second = pipeline(ctx, Kernel::Matmul, &geometry).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn wgpu_backend_routes_matrix_ops() {
        use crate::backend::{Backend, set_backend};
        use crate::matrix::Matrix;

        if !gpu_available() {
            return;
        }
        let a = Matrix::from_values(ramp(37 * 5, 0.5), 37, 5).unwrap();
        let b = Matrix::from_values(ramp(5 * 29, 0.25), 5, 29).unwrap();
        let on_cpu = a.try_mul(&b).unwrap();

        set_backend(Backend::Wgpu);
        let on_gpu = a.try_mul(&b);
        set_backend(Backend::Cpu);
        assert!(approx_eq(&on_gpu.unwrap(), &on_cpu));
    }
}
