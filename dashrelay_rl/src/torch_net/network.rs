use tch::{Device, TchError, Tensor};
use tch::nn::{Optimizer, OptimizerConfig, Path, VarStore};

/// Structure wrapping [`VarStore`] and network closure used to build neural network based function.
/// Variables created by the closure live in the stored [`VarStore`], which is what gets
/// snapshotted, copied to target network and written to disk.
pub struct NeuralNet<Output>{
    net: Box<dyn Fn(&Tensor) -> Output + Send>,
    var_store: VarStore,
}

/// [`NeuralNet`] producing Q-value for every action.
pub type QValueNet = NeuralNet<Tensor>;

/// # Example:
/// ```
/// use tch::{Device, Kind, nn, Tensor};
/// use tch::nn::VarStore;
/// use dashrelay_rl::torch_net::QValueNet;
/// let var_store = VarStore::new(Device::Cpu);
/// let neural_net = QValueNet::new(var_store, |path|{
///     let seq = nn::seq()
///         .add(nn::linear(path / "input", 8, 2, Default::default()));
///     move |tensor: &Tensor|{tensor.apply(&seq)}
/// });
/// let output = (neural_net.net())(&Tensor::zeros([8], (Kind::Float, Device::Cpu)));
/// assert_eq!(output.size(), vec![2]);
/// ```
impl<Output> NeuralNet<Output>{

    pub fn new<
        N: 'static + Send + Fn(&Tensor) -> Output,
        F: FnOnce(&Path) -> N>
    (var_store: VarStore, model_closure: F) -> Self{

        let device = var_store.root().device();
        let model = (model_closure)(&var_store.root());
        Self{
            var_store,
            net: Box::new(move |x| {(model)(&x.to_device(device))}),
        }
    }
    /// Build optimiser for network, given `OptimizerConfig`. Uses [`VarStore`] stored in [`NeuralNet`] struct.
    pub fn build_optimizer<OptC: OptimizerConfig>
        (&self, optimiser_config: OptC, learning_rate: f64) -> Result<Optimizer, TchError>{

        optimiser_config.build(&self.var_store, learning_rate)
    }
    /// Returns reference to internal network offering `Tensor -> Output` application.
    pub fn net(&self) -> &(dyn Fn(&Tensor) -> Output + Send){&self.net}

    pub fn device(&self) -> Device{
        self.var_store.device()
    }
    pub fn var_store(&self) -> &VarStore{
        &self.var_store
    }
    pub fn var_store_mut(&mut self) -> &mut VarStore{
        &mut self.var_store
    }
}
