use super::*;
use crate::math::{gelu, relu, relu6, sigmoid, silu};
use std::fmt;

/// Element-wise nonlinearity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Act {
    Relu,
    Relu6,
    Silu,
    Gelu,
    Sigmoid,
    Tanh,
}

impl Act {
    pub fn apply(self, x: f32) -> f32 {
        use self::Act::*;
        match self {
            Relu => relu(x),
            Relu6 => relu6(x),
            Silu => silu(x),
            Gelu => gelu(x),
            Sigmoid => sigmoid(x),
            Tanh => x.tanh(),
        }
    }
}

impl fmt::Display for Act {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Act::*;
        let name = match *self {
            Relu => "relu",
            Relu6 => "relu6",
            Silu => "silu",
            Gelu => "gelu",
            Sigmoid => "sigmoid",
            Tanh => "tanh",
        };
        write!(f, "{}", name)
    }
}

pub struct Activate {
    name: String,
    act: Act,
}

impl Activate {
    pub fn new(act: Act) -> Activate {
        Activate {
            name: act.to_string(),
            act,
        }
    }
}

impl Layer for Activate {
    fn name(&self) -> &str {
        &self.name
    }
    fn forward(&self, input: Activation) -> Result<Activation> {
        let act = self.act;
        Ok(input.mapv_into(|x| act.apply(x)))
    }
}
