// Built-in rig commands: both press the shared enter/reset button.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use super::{
    CommandParams, CommandRegistry, CommandResult, CommandSpec, HandlerError, HandlerReply,
    ParamKind, ParamSpec, RegistryError, handler,
};
use crate::input::InputMapping;
use crate::rig::InputDevice;

pub const ENTER_CAR: &str = "enter_car";
pub const RESET_CAR: &str = "reset_car";

pub const DEFAULT_HOLD_MS: u64 = 100;
const MAX_HOLD_MS: u64 = 5_000;

/// Register `enter_car` and `reset_car`.
pub fn register_builtin(
    registry: &mut CommandRegistry,
    mapping: &Arc<InputMapping>,
    device: &Arc<dyn InputDevice>,
) -> Result<(), RegistryError> {
    for (action, description) in [
        (ENTER_CAR, "Get in the car (presses the enter/reset button)"),
        (RESET_CAR, "Reset the car to the pits (presses the enter/reset button)"),
    ] {
        let spec = CommandSpec::new(action)
            .description(description)
            .param(
                ParamSpec::optional("hold_ms", ParamKind::Integer)
                    .describe("How long to hold the button, in milliseconds"),
            )
            .example(example_params());

        let mapping = Arc::clone(mapping);
        let device = Arc::clone(device);
        registry.register(
            spec,
            handler(move |params| {
                let mapping = Arc::clone(&mapping);
                let device = Arc::clone(&device);
                async move { press_mapped(action, &mapping, device.as_ref(), &params).await }
            }),
        )?;
    }
    Ok(())
}

async fn press_mapped(
    action: &str,
    mapping: &InputMapping,
    device: &dyn InputDevice,
    params: &CommandParams,
) -> Result<HandlerReply, HandlerError> {
    let button = mapping
        .get_button(action)
        .ok_or_else(|| HandlerError::new(format!("no button mapped for {action}")))?;
    let hold = hold_duration(params)?;

    device.press(button, hold).await.map_err(HandlerError::new)?;

    Ok(CommandResult::ok_with(format!(
        "Pressed button {button} for {}ms",
        hold.as_millis()
    ))
    .into())
}

fn hold_duration(params: &CommandParams) -> Result<Duration, HandlerError> {
    let millis = match params.get("hold_ms") {
        None | Some(Value::Null) => DEFAULT_HOLD_MS,
        Some(value) => value
            .as_u64()
            .filter(|ms| *ms <= MAX_HOLD_MS)
            .ok_or_else(|| {
                HandlerError::new(format!("hold_ms must be between 0 and {MAX_HOLD_MS}"))
            })?,
    };
    Ok(Duration::from_millis(millis))
}

fn example_params() -> CommandParams {
    let mut params = CommandParams::new();
    params.insert("hold_ms".into(), json!(DEFAULT_HOLD_MS));
    params
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::rig::InputError;

    #[derive(Default)]
    struct RecordingDevice {
        presses: Mutex<Vec<(u32, Duration)>>,
    }

    #[async_trait]
    impl InputDevice for RecordingDevice {
        async fn press(&self, button: u32, hold: Duration) -> Result<(), InputError> {
            self.presses.lock().unwrap().push((button, hold));
            Ok(())
        }

        async fn release_all(&self) -> Result<(), InputError> {
            Ok(())
        }
    }

    fn setup(dir: &tempfile::TempDir) -> (CommandRegistry, Arc<InputMapping>, Arc<RecordingDevice>) {
        let mapping = Arc::new(InputMapping::open(dir.path().join("joystick.json")));
        let device = Arc::new(RecordingDevice::default());
        let dyn_device: Arc<dyn InputDevice> = device.clone();
        let mut registry = CommandRegistry::new();
        register_builtin(&mut registry, &mapping, &dyn_device).unwrap();
        (registry, mapping, device)
    }

    #[tokio::test]
    async fn both_actions_press_the_shared_button() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, mapping, device) = setup(&dir);
        mapping.set_button(ENTER_CAR, Some(6)).unwrap();

        assert!(registry.execute(ENTER_CAR, None).await.success);
        let mut params = CommandParams::new();
        params.insert("hold_ms".into(), json!(250));
        assert!(registry.execute(RESET_CAR, Some(params)).await.success);

        assert_eq!(
            *device.presses.lock().unwrap(),
            vec![
                (6, Duration::from_millis(100)),
                (6, Duration::from_millis(250))
            ]
        );
    }

    #[tokio::test]
    async fn unmapped_button_fails_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _mapping, device) = setup(&dir);

        let result = registry.execute(RESET_CAR, None).await;
        assert_eq!(
            result,
            CommandResult::failure("Command execution error: no button mapped for reset_car")
        );
        assert!(device.presses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn excessive_hold_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, mapping, _device) = setup(&dir);
        mapping.set_button(ENTER_CAR, Some(1)).unwrap();

        let mut params = CommandParams::new();
        params.insert("hold_ms".into(), json!(60_000));
        let result = registry.execute(ENTER_CAR, Some(params)).await;
        assert!(!result.success);
        assert!(result.message.unwrap().contains("hold_ms must be between"));
    }

    #[test]
    fn registered_in_order_with_examples() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _, _) = setup(&dir);
        assert_eq!(registry.list_commands(), vec![ENTER_CAR, RESET_CAR]);
        let info = registry.get_info(ENTER_CAR).unwrap();
        assert_eq!(info.example_params, Some(example_params()));
    }
}
