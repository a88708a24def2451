use crate::error::{BenchError, Result};
use crate::layers::Param;
use crate::util::{read_file_as_f32s_checked, write_file_f32s};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use std::fs;
use std::path::{Path, PathBuf};

/// How a freshly created parameter is filled when no stored weights are used.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Init {
    /// He-normal for layers followed by a rectifier
    KaimingNormal { fan_in: usize },
    Normal { std: f32 },
    Zeros,
    Ones,
}

/// Where parameter values come from while a network is being built.
pub enum WeightSource {
    Seeded(StdRng),
    /// A directory of big-endian f32 files, one `<param-name>.bin` per parameter
    Directory(PathBuf),
}

impl WeightSource {
    pub fn seeded(seed: u64) -> WeightSource {
        WeightSource::Seeded(StdRng::seed_from_u64(seed))
    }

    pub fn directory<P: AsRef<Path>>(dir: P) -> WeightSource {
        WeightSource::Directory(dir.as_ref().to_path_buf())
    }

    /// Creates the parameter `name` with the given shape.
    pub fn param(&mut self, name: &str, shape: &[usize], init: Init) -> Result<Param> {
        let len = shape.iter().product::<usize>();
        trace!(
            "Create parameter {} with shape {:?} ({} values).",
            name,
            shape,
            len
        );
        let value = match *self {
            WeightSource::Seeded(ref mut rng) => random_array(shape, init, rng)?,
            WeightSource::Directory(ref dir) => {
                let path = param_path(dir, name);
                let values = read_file_as_f32s_checked(&path, len)?;
                ArrayD::from_shape_vec(IxDyn(shape), values)?
            }
        };
        Ok(Param::new(name, value))
    }
}

fn random_array(shape: &[usize], init: Init, rng: &mut StdRng) -> Result<ArrayD<f32>> {
    let std = match init {
        Init::Zeros => return Ok(ArrayD::zeros(IxDyn(shape))),
        Init::Ones => return Ok(ArrayD::ones(IxDyn(shape))),
        Init::KaimingNormal { fan_in } => (2.0 / fan_in.max(1) as f32).sqrt(),
        Init::Normal { std } => std,
    };
    let normal = Normal::new(0.0f32, std)
        .map_err(|e| BenchError::InvalidConfig(format!("weight init: {}", e)))?;
    Ok(ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.sample(normal)))
}

pub fn param_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.bin", name))
}

/// Writes every parameter into `dir` in the format `WeightSource::Directory` reads.
pub fn export_params<'a, I>(params: I, dir: &Path) -> Result<usize>
where
    I: IntoIterator<Item = &'a Param>,
{
    fs::create_dir_all(dir)?;
    let mut count = 0;
    for p in params {
        let data = p.value().iter().cloned().collect::<Vec<f32>>();
        write_file_f32s(param_path(dir, p.name()), &data)?;
        count += 1;
    }
    debug!("Exported {} parameters into {}.", count, dir.display());
    Ok(count)
}
