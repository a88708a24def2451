use super::*;
use rand::Rng;

/// Zeroes a random share `p` of the activations while training; identity in inference mode.
pub struct Dropout {
    name: String,
    p: f32,
    training: bool,
}

impl Dropout {
    pub fn new(name: &str, p: f32) -> Dropout {
        Dropout {
            name: name.to_owned(),
            p: p.max(0.0).min(1.0),
            training: true,
        }
    }
    pub fn is_training(&self) -> bool {
        self.training
    }
}

impl Layer for Dropout {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, mut input: Activation) -> Result<Activation> {
        if !self.training || self.p == 0.0 {
            return Ok(input);
        }
        if self.p >= 1.0 {
            input.fill(0.0);
            return Ok(input);
        }
        let keep_scale = 1.0 / (1.0 - self.p);
        let p = self.p;
        let mut rng = rand::thread_rng();
        input.mapv_inplace(|x| if rng.gen::<f32>() < p { 0.0 } else { x * keep_scale });
        Ok(input)
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
