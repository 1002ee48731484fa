use std::fs;
use std::path::Path;
use tch::nn::VarStore;
use tch::Tensor;
use dashrelay_core::agent::PolicyWeights;
use dashrelay_core::error::ExpertError;
use crate::error::DashRlError;

/// Detached copy of network variables, sorted by name.
///
/// Stored with [`Tensor::save_multi`], so a file is a plain named tensor archive.
#[derive(Debug)]
pub struct TensorWeights{
    tensors: Vec<(String, Tensor)>,
}

impl TensorWeights{
    /// Deep copy of every variable in `var_store`.
    pub fn capture(var_store: &VarStore) -> Self{
        let mut tensors: Vec<(String, Tensor)> = tch::no_grad(|| {
            var_store.variables().into_iter()
                .map(|(name, t)| (name, t.detach().copy()))
                .collect()
        });
        tensors.sort_by(|a, b| a.0.cmp(&b.0));
        Self{tensors}
    }

    /// Copies stored tensors into variables of `var_store`.
    /// Every variable must have a tensor of the same name and shape.
    pub fn restore_into(&self, var_store: &mut VarStore) -> Result<(), DashRlError>{
        let variables = var_store.variables();
        if variables.len() != self.tensors.len(){
            return Err(DashRlError::Torch {
                source: tch::TchError::Shape(format!("{} stored tensors for {} variables", self.tensors.len(), variables.len())),
                context: "restoring weights".into()
            })
        }
        tch::no_grad(|| -> Result<(), DashRlError> {
            for (name, mut var) in variables{
                let source = self.get(&name).ok_or_else(|| DashRlError::Torch {
                    source: tch::TchError::TensorNameNotFound(name.clone(), "stored weights".into()),
                    context: "restoring weights".into()
                })?;
                if source.size() != var.size(){
                    return Err(DashRlError::Torch {
                        source: tch::TchError::Shape(format!("{:?} stored, {:?} expected", source.size(), var.size())),
                        context: name
                    })
                }
                var.f_copy_(source).map_err(DashRlError::torch(&name))?;
            }
            Ok(())
        })
    }

    pub fn get(&self, name: &str) -> Option<&Tensor>{
        self.tensors.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn names(&self) -> impl Iterator<Item = &str>{
        self.tensors.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize{
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool{
        self.tensors.is_empty()
    }
}

impl Clone for TensorWeights{
    fn clone(&self) -> Self {
        Self{tensors: self.tensors.iter().map(|(n, t)| (n.clone(), t.copy())).collect()}
    }
}

impl PolicyWeights for TensorWeights{
    const EXTENSION: &'static str = "ot";

    fn save_to(&self, path: &Path) -> Result<(), ExpertError> {
        if let Some(parent) = path.parent(){
            fs::create_dir_all(parent)
                .map_err(|e| ExpertError::Io {path: parent.to_path_buf(), explanation: format!("{e}")})?;
        }
        Tensor::save_multi(&self.tensors, path)
            .map_err(|e| ExpertError::Io {path: path.to_path_buf(), explanation: format!("{e}")})
    }

    fn load_from(path: &Path) -> Result<Self, ExpertError> {
        if !path.exists(){
            return Err(ExpertError::Io {path: path.to_path_buf(), explanation: "file does not exist".into()})
        }
        let mut tensors = Tensor::load_multi(path)
            .map_err(|e| ExpertError::Format {path: path.to_path_buf(), reason: format!("{e}")})?;
        if tensors.is_empty(){
            return Err(ExpertError::Format {path: path.to_path_buf(), reason: "no tensors stored".into()})
        }
        tensors.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self{tensors})
    }
}

#[cfg(test)]
mod tests{
    use std::fs;
    use tch::Device;
    use dashrelay_core::agent::PolicyWeights;
    use dashrelay_core::error::ExpertError;
    use crate::torch_net::DuelingShape;
    use crate::weights::TensorWeights;

    #[test]
    fn weights_survive_disk_and_restore(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("slice_01_model.ot");
        let shape = DuelingShape::new(6, &[8], 4, 2);
        let source = shape.build(Device::Cpu);
        let weights = TensorWeights::capture(source.var_store());
        weights.save_to(&path).unwrap();

        let loaded = TensorWeights::load_from(&path).unwrap();
        assert_eq!(loaded.len(), weights.len());
        assert!(loaded.names().eq(weights.names()));

        let mut other = shape.build(Device::Cpu);
        loaded.restore_into(other.var_store_mut()).unwrap();
        let a = source.var_store().variables();
        let b = other.var_store().variables();
        for (name, t) in a{
            assert!(t.allclose(&b[&name], 0.0, 0.0, false), "{name} differs");
        }
    }

    #[test]
    fn captured_weights_are_detached_copies(){
        let net = DuelingShape::new(3, &[4], 2, 2).build(Device::Cpu);
        let weights = TensorWeights::capture(net.var_store());
        let before = weights.get("fc1.bias").unwrap().copy();
        tch::no_grad(|| {
            let mut b = net.var_store().variables()["fc1.bias"].shallow_clone();
            let _ = b.fill_(5.0);
        });
        assert!(weights.get("fc1.bias").unwrap().allclose(&before, 0.0, 0.0, false));
    }

    #[test]
    fn mismatched_shape_is_rejected(){
        let small = TensorWeights::capture(DuelingShape::new(3, &[4], 2, 2).build(Device::Cpu).var_store());
        let mut big = DuelingShape::new(3, &[8], 2, 2).build(Device::Cpu);
        assert!(small.restore_into(big.var_store_mut()).is_err());
    }

    #[test]
    fn garbage_file_is_format_error(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice_02_model.ot");
        fs::write(&path, "definitely not a tensor archive").unwrap();
        assert!(matches!(TensorWeights::load_from(&path), Err(ExpertError::Format {..})));
        assert!(matches!(TensorWeights::load_from(&dir.path().join("missing.ot")), Err(ExpertError::Io {..})));
    }
}
