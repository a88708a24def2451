use super::*;
use crate::math::global_avg_pool;
use ndarray::Axis;

/// `post(body(x) + shortcut(x))`; the shortcut is the identity when absent.
pub struct Residual {
    name: String,
    body: Sequential,
    shortcut: Option<Sequential>,
    post: Option<Box<dyn Layer>>,
}

impl Residual {
    pub fn new(name: &str, body: Sequential) -> Residual {
        Residual {
            name: name.to_owned(),
            body,
            shortcut: None,
            post: None,
        }
    }
    pub fn with_shortcut(mut self, shortcut: Sequential) -> Residual {
        self.shortcut = Some(shortcut);
        self
    }
    /// A layer applied after the sum, e.g. the rectifier of a ResNet block.
    pub fn with_post<L: Layer + 'static>(mut self, post: L) -> Residual {
        self.post = Some(Box::new(post));
        self
    }
}

impl Layer for Residual {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Activation) -> Result<Activation> {
        let skip = match self.shortcut {
            Some(ref shortcut) => shortcut.forward(input.clone())?,
            None => input.clone(),
        };
        let mut out = self.body.forward(input)?;
        if out.shape() != skip.shape() {
            return Err(BenchError::shape_mismatch(&self.name, skip.shape(), out.shape()));
        }
        out += &skip;
        match self.post {
            Some(ref post) => post.forward(out),
            None => Ok(out),
        }
    }

    fn parameters(&self) -> Vec<&Param> {
        let mut params = self.body.parameters();
        if let Some(ref shortcut) = self.shortcut {
            params.extend(shortcut.parameters());
        }
        if let Some(ref post) = self.post {
            params.extend(post.parameters());
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.body.parameters_mut();
        if let Some(ref mut shortcut) = self.shortcut {
            params.extend(shortcut.parameters_mut());
        }
        if let Some(ref mut post) = self.post {
            params.extend(post.parameters_mut());
        }
        params
    }

    fn set_training(&mut self, training: bool) {
        self.body.set_training(training);
        if let Some(ref mut shortcut) = self.shortcut {
            shortcut.set_training(training);
        }
        if let Some(ref mut post) = self.post {
            post.set_training(training);
        }
    }

    fn place(&mut self, target: &Target) -> Result<()> {
        self.body.place(target)?;
        if let Some(ref mut shortcut) = self.shortcut {
            shortcut.place(target)?;
        }
        if let Some(ref mut post) = self.post {
            post.place(target)?;
        }
        Ok(())
    }
}

/// Runs every branch on the same input and concatenates the results along the channel axis.
pub struct Concat {
    name: String,
    branches: Vec<Sequential>,
}

impl Concat {
    pub fn new(name: &str, branches: Vec<Sequential>) -> Concat {
        debug!(
            "Create concat-block {} with {} branches.",
            name,
            branches.len()
        );
        Concat {
            name: name.to_owned(),
            branches,
        }
    }
}

impl Layer for Concat {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Activation) -> Result<Activation> {
        let outputs = self
            .branches
            .iter()
            .map(|b| b.forward(input.clone()))
            .collect::<Result<Vec<Activation>>>()?;
        let views = outputs.iter().map(|o| o.view()).collect::<Vec<_>>();
        if views.is_empty() {
            return Ok(input);
        }
        Ok(ndarray::concatenate(Axis(1), &views)?)
    }

    fn parameters(&self) -> Vec<&Param> {
        self.branches.iter().flat_map(|b| b.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.branches
            .iter_mut()
            .flat_map(|b| b.parameters_mut())
            .collect()
    }

    fn set_training(&mut self, training: bool) {
        for branch in self.branches.iter_mut() {
            branch.set_training(training);
        }
    }

    fn place(&mut self, target: &Target) -> Result<()> {
        for branch in self.branches.iter_mut() {
            branch.place(target)?;
        }
        Ok(())
    }
}

/// Channel attention: squeezes every map to its mean, excites through a two-layer bottleneck and
/// rescales the input channels with the sigmoid of the result.
pub struct SqueezeExcite {
    name: String,
    reduce: Conv2d,
    expand: Conv2d,
    act: Act,
}

impl SqueezeExcite {
    pub fn new(
        src: &mut crate::network::WeightSource,
        name: &str,
        channels: usize,
        squeezed: usize,
        act: Act,
    ) -> Result<SqueezeExcite> {
        let one = crate::geometry::Window::from_side(1);
        Ok(SqueezeExcite {
            name: name.to_owned(),
            reduce: Conv2d::new(
                src,
                &format!("{}.fc1", name),
                channels,
                squeezed,
                one,
                1,
                true,
            )?,
            expand: Conv2d::new(
                src,
                &format!("{}.fc2", name),
                squeezed,
                channels,
                one,
                1,
                true,
            )?,
            act,
        })
    }
}

impl Layer for SqueezeExcite {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Activation) -> Result<Activation> {
        let mut x = to_nchw(&self.name, input)?;
        let (n, c, _, _) = x.dim();
        let pooled = global_avg_pool(x.view()).into_shape((n, c, 1, 1))?;

        let act = self.act;
        let s = self.reduce.forward(pooled.into_dyn())?.mapv_into(|v| act.apply(v));
        let s = self.expand.forward(s)?.mapv_into(crate::math::sigmoid::<f32>);
        let s = to_nchw(&self.name, s)?;

        x *= &s;
        Ok(x.into_dyn())
    }

    fn parameters(&self) -> Vec<&Param> {
        let mut params = self.reduce.parameters();
        params.extend(self.expand.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.reduce.parameters_mut();
        params.extend(self.expand.parameters_mut());
        params
    }

    fn place(&mut self, target: &Target) -> Result<()> {
        self.reduce.place(target)?;
        self.expand.place(target)
    }
}
