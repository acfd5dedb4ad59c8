use std::marker::PhantomData;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::cast::ToElement;
use burn::LearningRate;
use nn::loss::{MseLoss, Reduction};

use ql::ml_model::model::{DeepQLearningModel, DEFAULT_BATCH_SIZE};
use ql::prelude::{Action, Environment, ModelActionType, QlError, State};

/// CPU autodiff backend used by [QLearningBurnModel].
/// Inference and training share this type, so checkpoints are interchangeable
/// between the active and the stabilized network.
pub type QModelBackend = Autodiff<NdArray>;

const HIDDEN_SIZE: usize = 64;
const LEARNING_RATE: LearningRate = 1e-3;

/// Q-network: a fully connected net mapping a feature vector to one
/// Q-value per action.
#[derive(Module, Debug)]
pub struct QNet<B: Backend> {
    fc1: nn::Linear<B>,
    fc2: nn::Linear<B>,
    out: nn::Linear<B>,
    activation: nn::Relu,
}

impl<B: Backend> QNet<B> {
    pub fn new(device: &B::Device, state_size: usize, action_space: usize) -> Self {
        let fc1 = nn::LinearConfig::new(state_size, HIDDEN_SIZE)
            .with_bias(true)
            .init(device);
        let fc2 = nn::LinearConfig::new(HIDDEN_SIZE, HIDDEN_SIZE)
            .with_bias(true)
            .init(device);
        let out = nn::LinearConfig::new(HIDDEN_SIZE, action_space)
            .with_bias(true)
            .init(device);
        Self {
            fc1,
            fc2,
            out,
            activation: nn::Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.fc1.forward(input));
        let x = self.activation.forward(self.fc2.forward(x));
        self.out.forward(x)
    }
}

/// Fresh Adam optimizer instance for a [QNet].
/// Each model owns its own optimizer state.
pub fn adam_optimizer() -> impl Optimizer<QNet<QModelBackend>, QModelBackend> {
    AdamConfig::new().init::<QModelBackend, QNet<QModelBackend>>()
}

/// [DeepQLearningModel] implementation on top of a [QNet].
///
/// Network shape is derived from the environment's state and action space.
pub struct QLearningBurnModel<E, O, const BATCH_SIZE: usize = DEFAULT_BATCH_SIZE>
where
    E: Environment,
    O: Optimizer<QNet<QModelBackend>, QModelBackend>,
{
    net: QNet<QModelBackend>,
    optimizer: O,
    device: NdArrayDevice,
    _environment: PhantomData<E>,
}

impl<E, O, const BATCH_SIZE: usize> QLearningBurnModel<E, O, BATCH_SIZE>
where
    E: Environment,
    O: Optimizer<QNet<QModelBackend>, QModelBackend>,
{
    pub fn init(optimizer: O) -> Self {
        let device = NdArrayDevice::default();
        let net = QNet::new(
            &device,
            <E::S as State>::SIZE,
            <E::A as Action>::ACTION_SPACE as usize,
        );
        Self {
            net,
            optimizer,
            device,
            _environment: PhantomData,
        }
    }

    pub fn load_model(optimizer: O, checkpoint_file: &str) -> Result<Self> {
        let mut model = Self::init(optimizer);
        model.read_checkpoint(checkpoint_file)?;
        Ok(model)
    }

    fn batch_tensor(&self, state_batch: &[&Rc<E::S>]) -> Tensor<QModelBackend, 2> {
        let mut values = Vec::with_capacity(state_batch.len() * <E::S as State>::SIZE);
        for state in state_batch {
            values.extend_from_slice(state.as_features());
        }
        let data = TensorData::new(values, [state_batch.len(), <E::S as State>::SIZE]);
        Tensor::from_data(data, &self.device)
    }
}

impl<E, O, const BATCH_SIZE: usize> DeepQLearningModel<BATCH_SIZE>
    for QLearningBurnModel<E, O, BATCH_SIZE>
where
    E: Environment,
    O: Optimizer<QNet<QModelBackend>, QModelBackend>,
{
    type E = E;

    fn predict_action(&self, state: &E::S) -> E::A {
        let data = TensorData::new(state.as_features().to_vec(), [1, <E::S as State>::SIZE]);
        let input = Tensor::<QModelBackend, 2>::from_data(data, &self.device);
        let action = self
            .net
            .forward(input)
            .detach()
            .argmax(1)
            .into_scalar()
            .to_u32() as ModelActionType;
        Action::try_from_numeric(action).expect("model action should be in action space")
    }

    fn batch_predict_max_future_reward(
        &self,
        state_batch: [&Rc<E::S>; BATCH_SIZE],
    ) -> [f32; BATCH_SIZE] {
        let input = self.batch_tensor(&state_batch);
        let values: Vec<f32> = self
            .net
            .forward(input)
            .detach()
            .max_dim(1)
            .into_data()
            .to_vec()
            .expect("max future reward batch should be readable");
        values
            .try_into()
            .expect("max future reward batch should match the batch size")
    }

    fn train(
        &mut self,
        state_batch: [&Rc<E::S>; BATCH_SIZE],
        action_batch: [E::A; BATCH_SIZE],
        updated_q_values: [f32; BATCH_SIZE],
    ) -> Result<f32> {
        let states = self.batch_tensor(&state_batch);
        let action_indices: Vec<i64> = action_batch.iter().map(|a| a.numeric() as i64).collect();
        let actions = Tensor::<QModelBackend, 2, Int>::from_data(
            TensorData::new(action_indices, [BATCH_SIZE, 1]),
            &self.device,
        );
        let targets = Tensor::<QModelBackend, 2>::from_data(
            TensorData::new(updated_q_values.to_vec(), [BATCH_SIZE, 1]),
            &self.device,
        );

        // Q-values of the actions actually taken in the sampled transitions
        let q_values = self.net.forward(states).gather(1, actions);
        let loss = MseLoss::new().forward(q_values, targets, Reduction::Mean);
        let loss_value = loss.clone().into_scalar().to_f32();

        let grads = GradientsParams::from_grads(loss.backward(), &self.net);
        self.net = self
            .optimizer
            .step(LEARNING_RATE, self.net.clone(), grads);
        Ok(loss_value)
    }

    fn write_checkpoint(&self, file: &str) -> Result<String> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.net
            .clone()
            .save_file(PathBuf::from(file), &recorder)
            .map_err(|e| QlError(format!("failed to write model checkpoint '{file}': {e}")))?;
        Ok(format!("{file}.mpk"))
    }

    fn read_checkpoint(&mut self, file: &str) -> Result<()> {
        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(PathBuf::from(file), &self.device)
            .map_err(|e| QlError(format!("failed to read model checkpoint '{file}': {e}")))?;
        self.net = self.net.clone().load_record(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use push_block_env::gym_wrapper::GymWrapper;
    use push_block_env::push_block::mechanics::PushBlockAction;
    use push_block_env::simulation::{SimulationConfig, SimulationHandle, PUSH_BLOCK_SCENE};

    use super::*;

    const BATCH_SIZE: usize = 8;

    fn observation() -> Result<<GymWrapper as Environment>::S> {
        let handle = SimulationHandle::launch(SimulationConfig::new(PUSH_BLOCK_SCENE, true))?;
        let mut gym_env = GymWrapper::new(handle);
        gym_env.reset()
    }

    #[test]
    fn predict_action_stays_in_action_space() -> Result<()> {
        let observation = observation()?;
        let model =
            QLearningBurnModel::<GymWrapper, _, BATCH_SIZE>::init(adam_optimizer());
        let action = model.predict_action(&observation);
        assert!(action.numeric() < PushBlockAction::ACTION_SPACE);
        Ok(())
    }

    #[test]
    fn batch_predict_yields_one_value_per_state() -> Result<()> {
        let observation = Rc::new(observation()?);
        let model =
            QLearningBurnModel::<GymWrapper, _, BATCH_SIZE>::init(adam_optimizer());
        let batch: [&Rc<_>; BATCH_SIZE] = std::array::from_fn(|_| &observation);
        let rewards = model.batch_predict_max_future_reward(batch);
        assert!(rewards.iter().all(|r| r.is_finite()));
        Ok(())
    }

    #[test]
    fn train_returns_finite_loss() -> Result<()> {
        let observation = Rc::new(observation()?);
        let mut model =
            QLearningBurnModel::<GymWrapper, _, BATCH_SIZE>::init(adam_optimizer());
        let states: [&Rc<_>; BATCH_SIZE] = std::array::from_fn(|_| &observation);
        let actions: [PushBlockAction; BATCH_SIZE] = std::array::from_fn(|i| {
            PushBlockAction::try_from_numeric((i % 5) as ModelActionType).unwrap()
        });
        let targets = [1.0_f32; BATCH_SIZE];
        let loss = model.train(states, actions, targets)?;
        assert!(loss.is_finite());
        Ok(())
    }

    #[test]
    fn checkpoint_roundtrip_preserves_predictions() -> Result<()> {
        let observation = observation()?;
        let model =
            QLearningBurnModel::<GymWrapper, _, BATCH_SIZE>::init(adam_optimizer());
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("roundtrip");
        let written = model.write_checkpoint(file.to_str().unwrap())?;
        assert!(written.ends_with(".mpk"));

        let restored = QLearningBurnModel::<GymWrapper, _, BATCH_SIZE>::load_model(
            adam_optimizer(),
            file.to_str().unwrap(),
        )?;
        assert_eq!(
            model.predict_action(&observation),
            restored.predict_action(&observation)
        );
        Ok(())
    }
}
