//! OpenCL plumbing for the accelerated layers: device discovery, program setup, buffers and the
//! two device kernels (`conv2d`, `linear`).
use crate::device::Precision;
use crate::error::{BenchError, Result};
use crate::geometry::Window;
use half::f16;
use ndarray::{Array2, Array4, ArrayView2, ArrayView4};
use ocl::builders::{KernelBuilder, ProgramBuilder};
use ocl::enums::{DeviceInfo, DeviceInfoResult};
use ocl::flags::{self, DeviceType};
use ocl::{Buffer, Context, Device, OclPrm, Platform, Program, Queue, SpatialDims};
use std::fmt;

const KERNEL_SRC: &str = include_str!("../cl/kernels.cl");

/// An OpenCL GPU device and the platform it belongs to.
#[derive(Clone)]
pub struct ClDevice {
    platform: Platform,
    device: Device,
    name: String,
    host_unified_memory: bool,
}

impl ClDevice {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn host_unified_memory(&self) -> bool {
        self.host_unified_memory
    }
}

impl fmt::Debug for ClDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClDevice")
            .field("name", &self.name)
            .field("host_unified_memory", &self.host_unified_memory)
            .finish()
    }
}

/// Lists the GPU devices of every available platform. An absent OpenCL runtime yields an empty
/// list.
pub fn list_gpus() -> Vec<ClDevice> {
    let platforms = match ocl::core::get_platform_ids() {
        Ok(ids) => ids.into_iter().map(Platform::new).collect::<Vec<Platform>>(),
        Err(err) => {
            debug!("No OpenCL platforms: {}.", err);
            return vec![];
        }
    };

    let mut gpus = vec![];
    for platform in platforms {
        let devices = match Device::list(platform, Some(DeviceType::GPU)) {
            Ok(devices) => devices,
            Err(err) => {
                debug!("Skipping platform without GPUs: {}.", err);
                continue;
            }
        };
        for device in devices {
            let name = device.name().unwrap_or_else(|_| "unknown device".to_owned());
            let host_unified_memory = match device.info(DeviceInfo::HostUnifiedMemory) {
                Ok(DeviceInfoResult::HostUnifiedMemory(unified)) => unified,
                _ => false,
            };
            gpus.push(ClDevice {
                platform,
                device,
                name,
                host_unified_memory,
            });
        }
    }
    gpus
}

/// Queue, program and context for one device at one storage precision.
#[derive(Clone)]
pub struct ClContext {
    queue: Queue,
    program: Program,
    precision: Precision,
    _context: Context,
}

impl ClContext {
    /// Create a context, a queue and the program for `device`.
    pub fn new(device: &ClDevice, precision: Precision) -> Result<ClContext> {
        let context = Context::builder()
            .platform(device.platform)
            .devices(device.device)
            .build()?;

        let mut program_b = Program::builder();
        configure_program(&mut program_b, device.device, precision);
        let program = program_b.src(KERNEL_SRC).build(&context)?;

        let queue = Queue::new(&context, device.device, None)?;
        describe_device(&device.device)?;

        Ok(ClContext {
            queue,
            program,
            precision,
            _context: context,
        })
    }
    pub fn precision(&self) -> Precision {
        self.precision
    }
}

impl fmt::Debug for ClContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ClContext({})", self.precision)
    }
}

pub fn configure_program(program_b: &mut ProgramBuilder, device: Device, precision: Precision) {
    program_b.devices(device).cmplr_opt("-cl-std=CL1.2");
    if precision == Precision::Half {
        program_b.cmplr_opt("-D HALF_STORAGE");
    }
}

pub fn describe_device(device: &Device) -> Result<()> {
    let device_type = match device.info(DeviceInfo::Type)? {
        DeviceInfoResult::Type(t) => match t {
            flags::DeviceType::CPU => "CPU",
            flags::DeviceType::GPU => "GPU",
            _ => "unknown device type",
        },
        _ => "unknown device type",
    };
    info!("Using {} \"{}\".", device_type, device.name()?);
    debug!(
        "Maximum work-item-sizes: {}",
        device.info(DeviceInfo::MaxWorkItemSizes)?
    );
    Ok(())
}

/// Element type of device buffers; arithmetic happens in f32 on both sides.
pub trait Storage: OclPrm {
    fn from_f32(x: f32) -> Self;
    fn into_f32(self) -> f32;
}

impl Storage for f32 {
    fn from_f32(x: f32) -> Self {
        x
    }
    fn into_f32(self) -> f32 {
        self
    }
}

/// Half-precision floats travel as their bit patterns.
impl Storage for u16 {
    fn from_f32(x: f32) -> Self {
        f16::from_f32(x).to_bits()
    }
    fn into_f32(self) -> f32 {
        f16::from_bits(self).to_f32()
    }
}

pub fn create_buffer<T>(length: usize, flags: flags::MemFlags, queue: &Queue) -> Result<Buffer<T>>
where
    T: OclPrm,
{
    trace!(
        "Create buffer with {} elements. Flags: {:?}.",
        length,
        flags
    );
    Ok(Buffer::<T>::builder()
        .queue(queue.clone())
        .flags(flags)
        .len(length.max(1))
        .build()?)
}

fn upload<T: Storage>(data: &[f32], queue: &Queue) -> Result<Buffer<T>> {
    let converted = data.iter().map(|&x| T::from_f32(x)).collect::<Vec<T>>();
    let buf = create_buffer::<T>(converted.len(), flags::MEM_READ_ONLY, queue)?;
    if !converted.is_empty() {
        buf.write(&converted).enq()?;
    }
    Ok(buf)
}

pub unsafe fn read_buf<T: OclPrm>(buf: &Buffer<T>) -> ocl::Result<Vec<T>> {
    let mut mem_map = buf.map().flags(flags::MAP_READ).len(buf.len()).enq()?;
    let result = mem_map.to_vec();
    mem_map.unmap().enq()?;
    Ok(result)
}

/// Weights and bias of one layer, resident in device memory.
struct DeviceParams<T: Storage> {
    weights: Buffer<T>,
    bias: Buffer<T>,
    has_bias: bool,
}

enum StoredParams {
    Full(DeviceParams<f32>),
    Half(DeviceParams<u16>),
}

/// A layer whose weights live on the device and whose main computation runs there.
pub struct ClLayer {
    cl: ClContext,
    params: StoredParams,
}

impl ClLayer {
    pub fn upload(cl: &ClContext, weights: &[f32], bias: Option<&[f32]>) -> Result<ClLayer> {
        debug!(
            "Upload {} weights to device in {}, bias: {}.",
            weights.len(),
            cl.precision,
            bias.is_some()
        );
        let params = match cl.precision {
            Precision::Full => StoredParams::Full(upload_params(weights, bias, &cl.queue)?),
            Precision::Half => StoredParams::Half(upload_params(weights, bias, &cl.queue)?),
        };
        Ok(ClLayer {
            cl: cl.clone(),
            params,
        })
    }

    pub fn conv2d(
        &self,
        input: ArrayView4<f32>,
        out_channels: usize,
        window: &Window,
        groups: usize,
    ) -> Result<Array4<f32>> {
        let (n, in_c, in_h, in_w) = input.dim();
        let (out_h, out_w) = window
            .output_hw(in_h, in_w)
            .ok_or_else(|| BenchError::shape_mismatch("cl conv2d", window, input.shape()))?;
        let (pad_h, pad_w) = window.padding();
        let scalars = [
            in_c, in_h, in_w, out_channels, out_h, out_w, window.height(), window.width(),
            window.stride(), pad_h, pad_w, groups,
        ]
        .iter()
        .map(|&x| x as u32)
        .collect::<Vec<u32>>();
        let gws = SpatialDims::Three(out_w, out_h, n * out_channels);
        let data = input.iter().cloned().collect::<Vec<f32>>();

        let out = self.run(
            "conv2d",
            &data,
            n * out_channels * out_h * out_w,
            gws,
            &scalars,
        )?;
        Array4::from_shape_vec((n, out_channels, out_h, out_w), out)
            .map_err(|e| BenchError::shape_mismatch("cl conv2d", e, input.shape()))
    }

    pub fn linear(&self, input: ArrayView2<f32>, out_features: usize) -> Result<Array2<f32>> {
        let (rows, in_f) = input.dim();
        let scalars = [in_f as u32, out_features as u32];
        let gws = SpatialDims::Two(out_features, rows);
        let data = input.iter().cloned().collect::<Vec<f32>>();

        let out = self.run("linear", &data, rows * out_features, gws, &scalars)?;
        Array2::from_shape_vec((rows, out_features), out)
            .map_err(|e| BenchError::shape_mismatch("cl linear", e, input.shape()))
    }

    fn run(
        &self,
        kernel_func: &str,
        input: &[f32],
        out_len: usize,
        gws: SpatialDims,
        scalars: &[u32],
    ) -> Result<Vec<f32>> {
        match self.params {
            StoredParams::Full(ref p) => {
                self.run_with(p, kernel_func, input, out_len, gws, scalars)
            }
            StoredParams::Half(ref p) => {
                self.run_with(p, kernel_func, input, out_len, gws, scalars)
            }
        }
    }

    fn run_with<T: Storage>(
        &self,
        params: &DeviceParams<T>,
        kernel_func: &str,
        input: &[f32],
        out_len: usize,
        gws: SpatialDims,
        scalars: &[u32],
    ) -> Result<Vec<f32>> {
        let queue = &self.cl.queue;
        let in_buf = upload::<T>(input, queue)?;
        let out_buf = create_buffer::<T>(
            out_len,
            flags::MEM_WRITE_ONLY | flags::MEM_ALLOC_HOST_PTR,
            queue,
        )?;
        let has_bias = params.has_bias as u32;

        let mut builder = KernelBuilder::new();
        builder
            .program(&self.cl.program)
            .name(kernel_func)
            .queue(queue.clone())
            .global_work_size(gws)
            .arg(&in_buf)
            .arg(&out_buf)
            .arg(&params.weights)
            .arg(&params.bias);
        for s in scalars {
            builder.arg(s);
        }
        builder.arg(&has_bias);
        let kernel = builder.build()?;

        unsafe {
            kernel.cmd().queue(queue).enq()?;
        }
        queue.finish()?;

        let out = unsafe { read_buf(&out_buf)? };
        Ok(out.into_iter().take(out_len).map(T::into_f32).collect())
    }
}

fn upload_params<T: Storage>(
    weights: &[f32],
    bias: Option<&[f32]>,
    queue: &Queue,
) -> Result<DeviceParams<T>> {
    let (bias, has_bias) = match bias {
        Some(b) => (upload::<T>(b, queue)?, true),
        None => (upload::<T>(&[0.0], queue)?, false),
    };
    Ok(DeviceParams {
        weights: upload::<T>(weights, queue)?,
        bias,
        has_bias,
    })
}
