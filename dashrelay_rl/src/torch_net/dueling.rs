use serde::{Deserialize, Serialize};
use tch::nn::{self, Module, VarStore};
use tch::{Device, Kind, Tensor};
use crate::torch_net::QValueNet;

/// Shape of dueling Q network: shared fully connected trunk, then separate
/// value and advantage heads combined into `Q = V + (A - mean(A))`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelingShape{
    pub input: i64,
    pub hidden_layers: Vec<i64>,
    pub head: i64,
    pub actions: i64,
}

impl DuelingShape{
    pub fn new(input: usize, hidden_layers: &[i64], head: i64, actions: usize) -> Self{
        Self{input: input as i64, hidden_layers: hidden_layers.to_vec(), head, actions: actions as i64}
    }

    /// Builds fresh network with newly initialised variables on `device`.
    pub fn build(&self, device: Device) -> QValueNet{
        let shape = self.clone();
        QValueNet::new(VarStore::new(device), move |path|{
            let mut trunk = nn::seq();
            let mut width = shape.input;
            for (i, h) in shape.hidden_layers.iter().enumerate(){
                trunk = trunk
                    .add(nn::linear(path / format!("fc{}", i + 1), width, *h, Default::default()))
                    .add_fn(|xs| xs.relu());
                width = *h;
            }
            let value = nn::seq()
                .add(nn::linear(path / "value_hidden", width, shape.head, Default::default()))
                .add_fn(|xs| xs.relu())
                .add(nn::linear(path / "value_out", shape.head, 1, Default::default()));
            let advantage = nn::seq()
                .add(nn::linear(path / "advantage_hidden", width, shape.head, Default::default()))
                .add_fn(|xs| xs.relu())
                .add(nn::linear(path / "advantage_out", shape.head, shape.actions, Default::default()));

            move |xs: &Tensor|{
                let features = trunk.forward(xs);
                let v = value.forward(&features);
                let a = advantage.forward(&features);
                let mean_a = a.mean_dim(-1, true, Kind::Float);
                v + (a - mean_a)
            }
        })
    }
}

#[cfg(test)]
mod tests{
    use tch::{Device, Kind, Tensor};
    use crate::torch_net::DuelingShape;

    #[test]
    fn output_has_one_value_per_action(){
        let shape = DuelingShape::new(6, &[16, 16], 8, 2);
        let net = shape.build(Device::Cpu);
        let batch = Tensor::rand([5, 6], (Kind::Float, Device::Cpu));
        assert_eq!((net.net())(&batch).size(), vec![5, 2]);
        let single = Tensor::rand([1, 6], (Kind::Float, Device::Cpu));
        assert_eq!((net.net())(&single).size(), vec![1, 2]);
    }

    #[test]
    fn variables_are_named_by_layer(){
        let net = DuelingShape::new(4, &[8, 8], 4, 2).build(Device::Cpu);
        let variables = net.var_store().variables();
        for name in ["fc1.weight", "fc2.bias", "value_out.weight", "advantage_out.bias"]{
            assert!(variables.contains_key(name), "missing {name}");
        }
        assert_eq!(variables["advantage_out.weight"].size(), vec![2, 4]);
    }

    #[test]
    fn advantage_is_centered(){
        tch::manual_seed(7);
        let net = DuelingShape::new(3, &[8], 4, 3).build(Device::Cpu);
        let variables = net.var_store().variables();
        let xs = Tensor::rand([4, 3], (Kind::Float, Device::Cpu));
        // mean over actions of Q equals V, so it must not depend on advantage output bias
        let before = (net.net())(&xs).mean_dim(-1, false, Kind::Float);
        tch::no_grad(|| {
            let mut bias = variables["advantage_out.bias"].shallow_clone();
            let _ = bias.fill_(3.0);
        });
        let after = (net.net())(&xs).mean_dim(-1, false, Kind::Float);
        let diff = (before - after).abs().max().double_value(&[]);
        assert!(diff < 1e-5);
    }
}
