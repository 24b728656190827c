mod build;
mod config;
mod notify;
mod ollama;
mod panel;
mod prefs;
mod preview;

use iced::{
    widget::{button, column, container, row, scrollable, text, text_input, text_input::Id},
    Element, Length, Task, Theme, Font, Subscription, Color,
    time, clipboard,
    keyboard::{self, Key},
    event::{self, Event as IcedEvent},
    alignment,
    window,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::build::ShellBuildStep;
use crate::ollama::OllamaClient;
use crate::panel::{Notice, NoticeLevel, Panel, PanelCommand, PanelEvent};
use crate::prefs::{PreferenceStore, Preferences, SqlitePreferenceStore};

type AppPanel = Panel<SqlitePreferenceStore, OllamaClient, ShellBuildStep>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::load();
    info!(config = %config::Config::get_config_path().display(), "valrender starting");

    let store = SqlitePreferenceStore::open_default()?;
    let prefs = store.load();
    let client = OllamaClient::new(config.ollama.timeout_secs.map(Duration::from_secs))?;
    let build_step = ShellBuildStep::from_config(&config.build);

    let panel = Panel::new(store, client, build_step)
        .with_defaults(config.ollama.endpoint_url.clone(), config.ollama.model.clone());

    let settings = AppSettings {
        stylesheet: config.build.stylesheet_path(),
        desktop_notifications: config.notifications.desktop,
    };

    iced::application("ValRender AI", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: iced::Size::new(config.window.width as f32, config.window.height as f32),
            min_size: Some(iced::Size::new(
                config.window.min_width as f32,
                config.window.min_height as f32,
            )),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(move || App::new(panel, prefs, settings))
        .map_err(|e| anyhow::anyhow!("window error: {}", e))?;

    Ok(())
}

struct AppSettings {
    stylesheet: PathBuf,
    desktop_notifications: bool,
}

#[derive(Debug, Clone)]
enum Message {
    InputChanged(String),
    Submit,
    Created(Vec<PanelEvent>),
    Handled(Vec<PanelEvent>),
    CopyElement,
    ToggleSetup,
    EndpointUrlChanged(String),
    ModelNameChanged(String),
    DismissNotice,
    Preview,
    Tick,
    Escape,
}

struct App {
    input_text: String,
    element: String,
    endpoint_url: String,
    model_name: String,
    setup_open: bool,
    is_loading: bool,
    loading_frame: usize,
    notice: Option<Notice>,
    panel: AppPanel,
    settings: AppSettings,
    input_id: Id,
}

impl App {
    fn new(panel: AppPanel, prefs: Preferences, settings: AppSettings) -> (Self, Task<Message>) {
        let input_id = Id::unique();

        let mut app = App {
            input_text: String::new(),
            element: String::new(),
            endpoint_url: String::new(),
            model_name: String::new(),
            setup_open: false,
            is_loading: false,
            loading_frame: 0,
            notice: None,
            panel,
            settings,
            input_id: input_id.clone(),
        };
        app.apply_preferences(prefs);

        let startup_task = app.dispatch(PanelCommand::Startup, Message::Handled);
        let focus_task = text_input::focus(input_id);

        (app, Task::batch([startup_task, focus_task]))
    }

    fn apply_preferences(&mut self, prefs: Preferences) {
        self.element = prefs.element.unwrap_or_default();
        self.endpoint_url = prefs.endpoint_url.unwrap_or_default();
        self.model_name = prefs.model_name.unwrap_or_default();
    }

    fn dispatch(
        &self,
        command: PanelCommand,
        done: fn(Vec<PanelEvent>) -> Message,
    ) -> Task<Message> {
        let panel = self.panel.clone();
        Task::future(async move { done(panel.dispatch(command).await) })
    }

    fn reload(&mut self) {
        let prefs = self.panel.preferences();
        self.apply_preferences(prefs);
    }

    fn show_notice(&mut self, notice: Notice) {
        if self.settings.desktop_notifications {
            notify::desktop(&notice);
        }
        self.notice = Some(notice);
    }

    fn apply_events(&mut self, events: Vec<PanelEvent>) -> Task<Message> {
        let mut tasks = Vec::new();
        for event in events {
            match event {
                PanelEvent::Notify(notice) => self.show_notice(notice),
                PanelEvent::DisplayElement(element) => self.element = element,
                PanelEvent::CopyToClipboard(contents) => tasks.push(clipboard::write(contents)),
                PanelEvent::Reload => self.reload(),
            }
        }
        Task::batch(tasks)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputChanged(value) => {
                self.input_text = value;
                Task::none()
            }
            Message::Submit => {
                if self.input_text.is_empty() || self.is_loading {
                    return Task::none();
                }
                self.is_loading = true;
                self.dispatch(PanelCommand::Create(self.input_text.clone()), Message::Created)
            }
            Message::Created(events) => {
                self.is_loading = false;
                self.apply_events(events)
            }
            Message::Handled(events) => self.apply_events(events),
            Message::CopyElement => self.dispatch(PanelCommand::CopyElement, Message::Handled),
            Message::ToggleSetup => self.toggle_setup(),
            Message::EndpointUrlChanged(value) => {
                self.endpoint_url = value.clone();
                self.dispatch(PanelCommand::SetEndpointUrl(value), Message::Handled)
            }
            Message::ModelNameChanged(value) => {
                self.model_name = value.clone();
                self.dispatch(PanelCommand::SetModelName(value), Message::Handled)
            }
            Message::DismissNotice => {
                self.notice = None;
                Task::none()
            }
            Message::Preview => {
                if self.element.is_empty() {
                    self.show_notice(Notice::info("No element to preview."));
                } else if let Err(e) = preview::write_and_open(&self.settings.stylesheet, &self.element) {
                    warn!("preview failed: {:#}", e);
                    self.show_notice(Notice::error(format!("Error: {:#}", e)));
                }
                Task::none()
            }
            Message::Tick => {
                if self.is_loading {
                    self.loading_frame = (self.loading_frame + 1) % 40;
                }
                Task::none()
            }
            Message::Escape => {
                if self.setup_open {
                    self.toggle_setup()
                } else {
                    iced::exit()
                }
            }
        }
    }

    fn toggle_setup(&mut self) -> Task<Message> {
        self.setup_open = !self.setup_open;
        if self.setup_open {
            Task::none()
        } else {
            self.dispatch(PanelCommand::SetupModalExit, Message::Handled)
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.is_loading {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Escape)
            } else {
                None
            }
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<Message> {
        let input = text_input("What element do you want to build?", &self.input_text)
            .on_input(Message::InputChanged)
            .on_submit(Message::Submit)
            .padding(10)
            .size(16)
            .width(Length::Fixed(320.0))
            .id(self.input_id.clone());

        let create = button(text("Create"))
            .on_press_maybe((!self.is_loading).then_some(Message::Submit))
            .padding(10);
        let copy = button(text("Copy Element"))
            .on_press(Message::CopyElement)
            .padding(10);
        let setup = button(text("Setup"))
            .on_press(Message::ToggleSetup)
            .padding(10);

        let toolbar = row![
            row![input, create, copy].spacing(8),
            container(setup)
                .width(Length::Fill)
                .align_x(alignment::Horizontal::Right),
        ]
        .align_y(alignment::Vertical::Center);

        let body: Element<Message> = if self.setup_open {
            self.setup_view()
        } else if self.is_loading {
            self.loading_view()
        } else {
            self.output_view()
        };

        let mut content = column![toolbar].spacing(12).padding(12);
        if let Some(notice) = &self.notice {
            content = content.push(notice_view(notice));
        }
        content = content.push(body);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn setup_view(&self) -> Element<Message> {
        let endpoint = column![
            text("Ollama API URL").size(14),
            text_input("Ollama API URL", &self.endpoint_url)
                .on_input(Message::EndpointUrlChanged)
                .padding(10)
                .width(Length::Fixed(320.0)),
        ]
        .spacing(4);

        let model = column![
            text("AI Model").size(14),
            text_input("AI Model", &self.model_name)
                .on_input(Message::ModelNameChanged)
                .padding(10)
                .width(Length::Fixed(320.0)),
        ]
        .spacing(4);

        let done = button(text("Done")).on_press(Message::ToggleSetup).padding(10);

        container(column![endpoint, model, done].spacing(12))
            .width(Length::Fill)
            .height(Length::Fill)
            .align_x(alignment::Horizontal::Center)
            .align_y(alignment::Vertical::Center)
            .into()
    }

    fn loading_view(&self) -> Element<Message> {
        let frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        let messages = [
            "Sketching the markup...",
            "Picking utility classes...",
            "Nudging pixels...",
            "Asking the model nicely...",
        ];

        let message_idx = (self.loading_frame / 10) % messages.len();
        let spinner_idx = self.loading_frame % frames.len();

        container(
            column![
                text(frames[spinner_idx]).size(32),
                text(messages[message_idx]).size(15),
            ]
            .spacing(10)
            .align_x(alignment::Horizontal::Center),
        )
        .width(Length::Fill)
        .height(Length::Fill)
        .align_x(alignment::Horizontal::Center)
        .align_y(alignment::Vertical::Center)
        .into()
    }

    fn output_view(&self) -> Element<Message> {
        if self.element.is_empty() {
            return container(text("Describe an element and press Create.").size(15))
                .width(Length::Fill)
                .height(Length::Fill)
                .align_x(alignment::Horizontal::Center)
                .align_y(alignment::Vertical::Center)
                .into();
        }

        let markup = scrollable(
            container(text(self.element.clone()).size(15))
                .padding(15)
                .width(Length::Fill),
        )
        .height(Length::Fill);

        let preview = container(
            button(text("[Preview]").size(14))
                .on_press(Message::Preview)
                .padding(10),
        )
        .width(Length::Fill)
        .align_x(alignment::Horizontal::Right);

        column![markup, preview].spacing(8).into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn notice_view(notice: &Notice) -> Element<'_, Message> {
    let color = match notice.level {
        NoticeLevel::Info => Color::from_rgb(0.6, 0.8, 1.0),
        NoticeLevel::Warning => Color::from_rgb(1.0, 0.8, 0.3),
        NoticeLevel::Error => Color::from_rgb(1.0, 0.4, 0.4),
    };

    row![
        container(text(notice.message.as_str()).size(14).color(color)).width(Length::Fill),
        button(text("x").size(14))
            .on_press(Message::DismissNotice)
            .padding(6),
    ]
    .align_y(alignment::Vertical::Center)
    .spacing(8)
    .into()
}
