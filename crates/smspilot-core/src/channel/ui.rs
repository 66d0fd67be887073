//! UI-automation channel - types the instruction into the editor's chat.
//!
//! Script: focus window -> open chat -> clear input -> type -> enter -> settle
//! -> select all + copy -> read clipboard.
//!
//! Runs under a channel-scoped lock so two commands never interleave keystrokes.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::desktop::{Desktop, InputStep, KeyName, WindowInfo};
use super::{Channel, ChannelError, ChannelKind, TierPayload};
use crate::command::{Command, Intent, IntentKind};
use crate::config::UiConfig;
use crate::formatter::truncate_tail;

pub struct UiAutomationChannel {
    desktop: Arc<dyn Desktop>,
    config: UiConfig,
    chat_hotkey: Vec<KeyName>,
    lock: Arc<Mutex<()>>,
}

impl UiAutomationChannel {
    pub fn new(desktop: Arc<dyn Desktop>, config: UiConfig) -> Self {
        let chat_hotkey = KeyName::parse_chord(&config.chat_hotkey).unwrap_or_else(|| {
            tracing::warn!("invalid chat hotkey '{}', using ctrl+l", config.chat_hotkey);
            vec![KeyName::Control, KeyName::Char('l')]
        });
        Self {
            desktop,
            config,
            chat_hotkey,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Input events for an instruction, excluding focus and read-back.
    pub fn script(&self, instruction: &str) -> Vec<InputStep> {
        let step_delay = Duration::from_millis(self.config.step_delay_ms);
        vec![
            InputStep::Chord(self.chat_hotkey.clone()),
            InputStep::Wait(step_delay),
            InputStep::Chord(vec![KeyName::Control, KeyName::Char('a')]),
            InputStep::Press(KeyName::Delete),
            InputStep::Wait(step_delay),
            InputStep::Type(instruction.to_string()),
            InputStep::Wait(step_delay),
            InputStep::Press(KeyName::Enter),
            InputStep::Wait(Duration::from_millis(self.config.settle_delay_ms)),
        ]
    }

    fn readback_script(&self) -> Vec<InputStep> {
        vec![
            InputStep::Chord(vec![KeyName::Control, KeyName::Char('a')]),
            InputStep::Chord(vec![KeyName::Control, KeyName::Char('c')]),
            InputStep::Wait(Duration::from_millis(self.config.step_delay_ms)),
        ]
    }

    fn find_window(desktop: &dyn Desktop, title: &str) -> Result<WindowInfo, ChannelError> {
        let windows = desktop
            .windows()
            .map_err(|e| ChannelError::Unavailable(format!("window lookup failed: {}", e)))?;
        windows
            .into_iter()
            .find(|w| w.title_matches(title))
            .ok_or_else(|| ChannelError::Unavailable(format!("no window titled '{}'", title)))
    }
}

#[async_trait]
impl Channel for UiAutomationChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::UiAutomation
    }

    async fn execute(&self, intent: &Intent, command: &Command) -> Result<TierPayload, ChannelError> {
        if intent.kind == IntentKind::Clarify {
            return Err(ChannelError::SchemaMismatch(
                "nothing to type for an unclassified request".to_string(),
            ));
        }

        let guard = self.lock.clone().lock_owned().await;

        let desktop = self.desktop.clone();
        let config = self.config.clone();
        let instruction = intent.editor_instruction();
        let script = self.script(&instruction);
        let readback = self.readback_script();
        let command_id = command.id;

        // The guard moves into the blocking thread: an abandoned (timed-out)
        // script still holds the window until its last event is sent.
        tokio::task::spawn_blocking(move || -> Result<TierPayload, ChannelError> {
            let _guard = guard;
            let window = Self::find_window(desktop.as_ref(), &config.window_title)?;
            tracing::info!(%command_id, title = %window.title, "focusing editor window");

            desktop
                .focus(&window)
                .map_err(|e| ChannelError::Unavailable(format!("focus failed: {}", e)))?;

            for step in script.iter().chain(readback.iter()) {
                desktop
                    .send(step)
                    .map_err(|e| ChannelError::Failed(format!("input event failed: {}", e)))?;
            }

            let captured = desktop.read_clipboard().unwrap_or_else(|e| {
                tracing::debug!("clipboard read-back failed: {}", e);
                None
            });

            match captured {
                Some(text) if text.trim().chars().count() >= config.min_readback_chars => {
                    let tail = truncate_tail(text.trim(), config.readback_tail_chars);
                    Ok(TierPayload::text(tail))
                }
                _ if config.require_readback => Err(ChannelError::Failed(
                    "no confirmation text visible after sending".to_string(),
                )),
                _ => Ok(TierPayload::text(format!("Sent to {}", window.app_name_or_title()))),
            }
        })
        .await
        .map_err(|e| ChannelError::Failed(format!("automation thread panicked: {}", e)))?
    }
}

impl WindowInfo {
    fn app_name_or_title(&self) -> &str {
        if self.app_name.trim().is_empty() {
            &self.title
        } else {
            &self.app_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingDesktop {
        windows: Vec<WindowInfo>,
        clipboard: Option<String>,
        steps: StdMutex<Vec<InputStep>>,
        focused: StdMutex<Vec<u32>>,
    }

    impl RecordingDesktop {
        fn with_editor(clipboard: Option<&str>) -> Self {
            Self {
                windows: vec![
                    WindowInfo {
                        id: 7,
                        title: "Terminal".into(),
                        app_name: "Terminal".into(),
                        x: 0,
                        y: 0,
                        width: 640,
                        height: 480,
                    },
                    WindowInfo {
                        id: 9,
                        title: "hello.py - demo - Cursor".into(),
                        app_name: "Cursor".into(),
                        x: 100,
                        y: 50,
                        width: 1200,
                        height: 800,
                    },
                ],
                clipboard: clipboard.map(String::from),
                ..Default::default()
            }
        }

        fn typed(&self) -> Vec<String> {
            self.steps
                .lock()
                .unwrap()
                .iter()
                .filter_map(|s| match s {
                    InputStep::Type(t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl Desktop for RecordingDesktop {
        fn windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
            Ok(self.windows.clone())
        }

        fn focus(&self, window: &WindowInfo) -> anyhow::Result<()> {
            self.focused.lock().unwrap().push(window.id);
            Ok(())
        }

        fn send(&self, step: &InputStep) -> anyhow::Result<()> {
            self.steps.lock().unwrap().push(step.clone());
            Ok(())
        }

        fn read_clipboard(&self) -> anyhow::Result<Option<String>> {
            Ok(self.clipboard.clone())
        }
    }

    fn fast_config() -> UiConfig {
        UiConfig {
            step_delay_ms: 0,
            settle_delay_ms: 0,
            ..UiConfig::default()
        }
    }

    fn create_intent() -> (Intent, Command) {
        let command = Command::new("make a calculator", "+15550001111", "+15550002222");
        let intent = Intent::new(IntentKind::CreateFile, "Write a calculator", "Creating a calculator")
            .with_file("calc.py");
        (intent, command)
    }

    #[tokio::test]
    async fn missing_window_fails_without_input_events() {
        let desktop = Arc::new(RecordingDesktop::default());
        let channel = UiAutomationChannel::new(desktop.clone(), fast_config());
        let (intent, command) = create_intent();

        let err = channel.execute(&intent, &command).await.unwrap_err();

        assert!(matches!(err, ChannelError::Unavailable(_)));
        assert!(desktop.steps.lock().unwrap().is_empty());
        assert!(desktop.focused.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn types_instruction_into_matching_window_and_reads_back() {
        let desktop = Arc::new(RecordingDesktop::with_editor(Some(
            "You: Create the file calc.py\nAssistant: Created calc.py with add, sub, mul, div.",
        )));
        let channel = UiAutomationChannel::new(desktop.clone(), fast_config());
        let (intent, command) = create_intent();

        let payload = channel.execute(&intent, &command).await.unwrap();

        assert_eq!(*desktop.focused.lock().unwrap(), vec![9]);
        assert_eq!(
            desktop.typed(),
            vec!["Create the file calc.py: Write a calculator".to_string()]
        );
        assert!(payload.text.ends_with("Created calc.py with add, sub, mul, div."));
        let steps = desktop.steps.lock().unwrap();
        assert_eq!(steps[0], InputStep::Chord(vec![KeyName::Control, KeyName::Char('l')]));
        assert!(steps.contains(&InputStep::Press(KeyName::Enter)));
    }

    #[tokio::test]
    async fn short_readback_is_heuristic_success_by_default() {
        let desktop = Arc::new(RecordingDesktop::with_editor(Some("ok")));
        let channel = UiAutomationChannel::new(desktop, fast_config());
        let (intent, command) = create_intent();

        let payload = channel.execute(&intent, &command).await.unwrap();
        assert_eq!(payload.text, "Sent to Cursor");
    }

    #[tokio::test]
    async fn require_readback_turns_silence_into_failure() {
        let desktop = Arc::new(RecordingDesktop::with_editor(None));
        let config = UiConfig {
            require_readback: true,
            ..fast_config()
        };
        let channel = UiAutomationChannel::new(desktop, config);
        let (intent, command) = create_intent();

        let err = channel.execute(&intent, &command).await.unwrap_err();
        assert!(matches!(err, ChannelError::Failed(_)));
    }

    #[tokio::test]
    async fn clarify_intent_is_not_typed() {
        let desktop = Arc::new(RecordingDesktop::with_editor(None));
        let channel = UiAutomationChannel::new(desktop.clone(), fast_config());
        let command = Command::new("???", "+1", "+2");

        let err = channel
            .execute(&Intent::clarify("???"), &command)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SchemaMismatch(_)));
        assert!(desktop.steps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_commands_do_not_interleave() {
        let desktop = Arc::new(RecordingDesktop::with_editor(None));
        let channel = Arc::new(UiAutomationChannel::new(desktop.clone(), fast_config()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                let command = Command::new("x", "+1", "+2");
                let intent = Intent::new(IntentKind::EditFile, &format!("edit {}", i), "Editing");
                channel.execute(&intent, &command).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Each script is contiguous: every Type is followed by its own Enter before the next Type.
        {
            let steps = desktop.steps.lock().unwrap();
            let mut open = false;
            for step in steps.iter() {
                match step {
                    InputStep::Type(_) => {
                        assert!(!open, "two scripts interleaved");
                        open = true;
                    }
                    InputStep::Press(KeyName::Enter) => open = false,
                    _ => {}
                }
            }
        }
        assert_eq!(desktop.typed().len(), 4);
    }
}
