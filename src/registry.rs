//! The model zoo: every supported architecture, its input contract and how to build it.
use crate::device::Placement;
use crate::error::{BenchError, Result};
use crate::geometry::ImageGeometry;
use crate::network::{self, Network, Scale, WeightSource};
use crate::tensor::Tensor;
use crate::{IMAGE_INPUT, SEQUENCE_LEN, TOKEN_RANGE};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    MobilenetV2,
    Resnet50,
    Vgg16,
    EfficientnetB0,
    InceptionV3,
    Bert,
    Gpt2,
}

impl ModelId {
    pub const ALL: [ModelId; 7] = [
        ModelId::MobilenetV2,
        ModelId::Resnet50,
        ModelId::Vgg16,
        ModelId::EfficientnetB0,
        ModelId::InceptionV3,
        ModelId::Bert,
        ModelId::Gpt2,
    ];

    pub fn as_str(&self) -> &'static str {
        use self::ModelId::*;
        match *self {
            MobilenetV2 => "mobilenet_v2",
            Resnet50 => "resnet50",
            Vgg16 => "vgg16",
            EfficientnetB0 => "efficientnet_b0",
            InceptionV3 => "inception_v3",
            Bert => "bert",
            Gpt2 => "gpt2",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<ModelId> {
        ModelId::ALL
            .iter()
            .find(|id| id.as_str() == s)
            .cloned()
            .ok_or_else(|| BenchError::unsupported_model(s))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFamily {
    ImageClassification,
    Sequence,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ModelFamily::ImageClassification => write!(f, "image classification"),
            ModelFamily::Sequence => write!(f, "sequence"),
        }
    }
}

/// The synthetic input a model family expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSpec {
    /// NCHW standard-normal images
    Image(ImageGeometry),
    /// Token indices drawn uniformly from `[0, high)`
    Tokens { seq_len: usize, high: i64 },
}

impl InputSpec {
    pub fn shape(&self, batch_size: usize) -> Vec<usize> {
        match *self {
            InputSpec::Image(ref geometry) => geometry.batch_shape(batch_size),
            InputSpec::Tokens { seq_len, .. } => vec![batch_size, seq_len],
        }
    }

    /// Draws a batch bound to `placement`.
    pub fn synthesize<R: Rng>(
        &self,
        batch_size: usize,
        placement: Placement,
        rng: &mut R,
    ) -> Tensor {
        let shape = self.shape(batch_size);
        match *self {
            InputSpec::Image(_) => Tensor::randn(&shape, placement, rng),
            InputSpec::Tokens { high, .. } => Tensor::randint(&shape, high, placement, rng),
        }
    }
}

pub type BuildFn = fn(&mut WeightSource, Scale) -> Result<Network>;

pub struct ModelEntry {
    family: ModelFamily,
    input: InputSpec,
    /// Cargo feature the family is compiled under, if any
    feature: Option<&'static str>,
    build: Option<BuildFn>,
}

impl ModelEntry {
    pub fn family(&self) -> ModelFamily {
        self.family
    }
    pub fn input(&self) -> InputSpec {
        self.input
    }
    pub fn feature(&self) -> Option<&'static str> {
        self.feature
    }
    pub fn is_available(&self) -> bool {
        self.build.is_some()
    }
    /// Returns the constructor, or `DependencyMissing` if the family was compiled out.
    pub fn builder(&self, id: ModelId) -> Result<BuildFn> {
        self.build.ok_or_else(|| BenchError::DependencyMissing {
            model: id.to_string(),
            feature: self.feature.unwrap_or("default"),
        })
    }
}

fn image(build: BuildFn) -> ModelEntry {
    ModelEntry {
        family: ModelFamily::ImageClassification,
        input: InputSpec::Image(IMAGE_INPUT),
        feature: None,
        build: Some(build),
    }
}

fn sequence(build: Option<BuildFn>) -> ModelEntry {
    ModelEntry {
        family: ModelFamily::Sequence,
        input: InputSpec::Tokens {
            seq_len: SEQUENCE_LEN,
            high: TOKEN_RANGE,
        },
        feature: Some("transformers"),
        build,
    }
}

#[cfg(feature = "transformers")]
fn sequence_builders() -> (Option<BuildFn>, Option<BuildFn>) {
    (Some(network::bert), Some(network::gpt2))
}

#[cfg(not(feature = "transformers"))]
fn sequence_builders() -> (Option<BuildFn>, Option<BuildFn>) {
    (None, None)
}

lazy_static! {
    static ref REGISTRY: HashMap<ModelId, ModelEntry> = {
        let (bert, gpt2) = sequence_builders();
        let mut m = HashMap::new();
        m.insert(ModelId::MobilenetV2, image(network::mobilenet_v2));
        m.insert(ModelId::Resnet50, image(network::resnet50));
        m.insert(ModelId::Vgg16, image(network::vgg16));
        m.insert(ModelId::EfficientnetB0, image(network::efficientnet_b0));
        m.insert(ModelId::InceptionV3, image(network::inception_v3));
        m.insert(ModelId::Bert, sequence(bert));
        m.insert(ModelId::Gpt2, sequence(gpt2));
        m
    };
}

/// Looks up the registration of `id`.
pub fn entry(id: ModelId) -> Result<&'static ModelEntry> {
    REGISTRY.get(&id).ok_or_else(|| BenchError::unsupported_model(id.as_str()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_id_round_trips_through_its_name() {
        for id in ModelId::ALL.iter() {
            assert_eq!(id.as_str().parse::<ModelId>().unwrap(), *id);
            assert!(entry(*id).is_ok());
        }
    }

    #[test]
    fn unknown_name_is_unsupported() {
        match "alexnet".parse::<ModelId>() {
            Err(BenchError::UnsupportedModel { model }) => assert_eq!(model, "alexnet"),
            other => panic!("expected UnsupportedModel, got {:?}", other),
        }
    }

    #[test]
    fn input_shapes_follow_family() {
        let image = entry(ModelId::Resnet50).unwrap();
        assert_eq!(image.input().shape(4), vec![4, 3, 224, 224]);
        let seq = entry(ModelId::Gpt2).unwrap();
        assert_eq!(seq.family(), ModelFamily::Sequence);
        assert_eq!(seq.input().shape(2), vec![2, 16]);
    }

    #[cfg(not(feature = "transformers"))]
    #[test]
    fn sequence_family_reports_missing_feature() {
        let e = entry(ModelId::Bert).unwrap();
        assert!(!e.is_available());
        match e.builder(ModelId::Bert) {
            Err(BenchError::DependencyMissing { model, feature }) => {
                assert_eq!(model, "bert");
                assert_eq!(feature, "transformers");
            }
            Err(other) => panic!("expected DependencyMissing, got {:?}", other),
            Ok(_) => panic!("expected DependencyMissing"),
        }
    }
}
