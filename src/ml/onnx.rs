use log::debug;
#[cfg(all(target_vendor = "apple", not(target_os = "ios")))]
use ort::CoreMLExecutionProvider;
#[cfg(target_os = "android")]
use ort::NNAPIExecutionProvider;
use ort::{
    CPUExecutionProvider, ExecutionProviderDispatch, GraphOptimizationLevel, Session, Tensor,
    XNNPACKExecutionProvider,
};

use crate::ml::{
    error::{MlError, MlResult},
    runtime::ExecutionProviderPolicy,
};

/// One set of execution providers to try a session with.
struct ProviderAttempt {
    label: &'static str,
    providers: Vec<ExecutionProviderDispatch>,
}

/// First float output of a session run, flattened in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Opens a detector model, walking from the preferred accelerators down to
/// plain CPU until a session commits.
pub fn build_session(model_path: &str, policy: &ExecutionProviderPolicy) -> MlResult<Session> {
    let attempts = provider_attempts(policy);
    if attempts.is_empty() {
        return Err(MlError::InvalidRequest(
            "no execution provider is usable on this platform with CPU fallback disabled"
                .to_string(),
        ));
    }

    let mut failures = Vec::with_capacity(attempts.len());
    for ProviderAttempt { label, providers } in attempts {
        match commit_session(model_path, providers) {
            Ok(session) => {
                debug!("opened '{model_path}' with {label} providers");
                return Ok(session);
            }
            Err(error) => {
                debug!("{label} providers failed for '{model_path}': {error}");
                failures.push(format!("{label}: {error}"));
            }
        }
    }

    Err(MlError::DetectionUnavailable(format!(
        "could not open detector model '{model_path}' ({})",
        failures.join("; ")
    )))
}

fn provider_attempts(policy: &ExecutionProviderPolicy) -> Vec<ProviderAttempt> {
    let mut attempts = vec![ProviderAttempt {
        label: "preferred",
        providers: providers_for_policy(policy, true),
    }];

    if policy.allow_cpu_fallback {
        if policy.prefer_xnnpack {
            attempts.push(ProviderAttempt {
                label: "without-xnnpack",
                providers: providers_for_policy(policy, false),
            });
        }
        attempts.push(ProviderAttempt {
            label: "cpu",
            providers: providers_for_policy(&ExecutionProviderPolicy::cpu_only(), false),
        });
    }

    attempts.retain(|attempt| !attempt.providers.is_empty());
    attempts
}

fn providers_for_policy(
    policy: &ExecutionProviderPolicy,
    include_xnnpack: bool,
) -> Vec<ExecutionProviderDispatch> {
    let mut providers: Vec<ExecutionProviderDispatch> = Vec::new();

    // CoreML stays off on iOS, where the host app links its own ORT runtime.
    #[cfg(all(target_vendor = "apple", not(target_os = "ios")))]
    if policy.prefer_coreml {
        providers.push(CoreMLExecutionProvider::default().build());
    }

    #[cfg(target_os = "android")]
    if policy.prefer_nnapi {
        providers.push(NNAPIExecutionProvider::default().with_disable_cpu().build());
    }

    if policy.allow_cpu_fallback {
        if include_xnnpack && policy.prefer_xnnpack {
            providers.push(XNNPACKExecutionProvider::default().build());
        }
        providers.push(
            CPUExecutionProvider::default()
                .with_arena_allocator()
                .build(),
        );
    }

    providers
}

fn commit_session(
    model_path: &str,
    providers: Vec<ExecutionProviderDispatch>,
) -> MlResult<Session> {
    Ok(Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .with_inter_threads(1)?
        .with_execution_providers(providers)?
        .commit_from_file(model_path)?)
}

/// Feeds one float tensor through the session and returns its first output.
pub fn run_f32(
    session: &Session,
    input: Vec<f32>,
    input_shape: [i64; 4],
) -> MlResult<TensorOutput> {
    let input_tensor = Tensor::<f32>::from_array((input_shape.to_vec(), input))?;
    let outputs = session.run(ort::inputs![input_tensor]?)?;
    if outputs.is_empty() {
        return Err(MlError::DetectionUnavailable(
            "detector model produced no output tensor".to_string(),
        ));
    }
    let tensor = outputs[0].try_extract_tensor::<f32>()?;
    Ok(TensorOutput {
        shape: tensor.shape().to_vec(),
        data: tensor.iter().copied().collect(),
    })
}
