use eframe::egui::{Align, Button, Color32, ComboBox, Layout, RichText, ScrollArea, TextEdit};
use eframe::{Frame, egui};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use wordwise::config::AppConfig;
use wordwise::llm::openai::OpenAiChat;
use wordwise::session::Role;
use wordwise::*;

type Reporter = Box<dyn Fn(&str) + Send + Sync>;
type Translator = LlmTranslationService<OpenAiChat, Reporter>;

const USER_BUBBLE: Color32 = Color32::from_rgb(0x00, 0x84, 0xff);
const BOT_BUBBLE: Color32 = Color32::from_rgb(0xf0, 0xf2, 0xf5);

#[derive(Debug)]
enum UiEvent {
    Completed(TranslationResult),
    Notice(String),
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let cfg_path = std::env::args().nth(1);
    let cfg = AppConfig::load(cfg_path.as_deref().map(Path::new))?;

    let runtime = tokio::runtime::Runtime::new()?;

    let (tx, rx) = std::sync::mpsc::channel();
    let notice_tx = tx.clone();
    let reporter: Reporter = Box::new(move |notice: &str| {
        let _ = notice_tx.send(UiEvent::Notice(notice.to_owned()));
    });
    let translator = Arc::new(wordwise::translator(&cfg, Some(reporter)));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([720.0, 560.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Multilanguage Translator",
        options,
        Box::new(|_cc| {
            Ok(Box::new(ChatGui {
                session: ChatSession::from_config(&cfg),
                input: "".to_owned(),
                translator,
                runtime,
                tx,
                rx,
                in_flight: None,
            }))
        }),
    )
    .map_err(|err| anyhow::anyhow!("eframe/egui run failed: {err}"))
}

struct ChatGui {
    session: ChatSession,
    input: String,
    translator: Arc<Translator>,
    runtime: tokio::runtime::Runtime,
    tx: Sender<UiEvent>,
    rx: Receiver<UiEvent>,
    in_flight: Option<thread::JoinHandle<()>>,
}

impl ChatGui {
    fn drain_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                UiEvent::Completed(result) => {
                    self.session.complete(&result);
                    self.in_flight = None;
                }
                UiEvent::Notice(notice) => self.session.push_notice(notice),
            }
        }
    }

    fn send(&mut self, ctx: &egui::Context) {
        let Some(pending) = self.session.begin(&self.input) else {
            return;
        };
        self.input.clear();

        let handle = self.runtime.handle().clone();
        let translator = Arc::clone(&self.translator);
        let tx = self.tx.clone();
        let ctx = ctx.clone();

        self.in_flight = Some(thread::spawn(move || {
            let notice_tx = tx.clone();
            let result = pending.run_blocking(&handle, translator.as_ref(), |notice| {
                let _ = notice_tx.send(UiEvent::Notice(notice.to_owned()));
            });
            let _ = tx.send(UiEvent::Completed(result));
            ctx.request_repaint();
        }));
    }

    fn language_picker(ui: &mut egui::Ui, id: &str, label: &str, selected: &mut Language) {
        ui.label(label);
        ComboBox::from_id_salt(id)
            .selected_text(selected.name())
            .show_ui(ui, |ui| {
                for lang in Language::ALL {
                    ui.selectable_value(selected, lang, lang.name());
                }
            });
    }
}

impl eframe::App for ChatGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.drain_events();

        egui::TopBottomPanel::top("languages").show(ctx, |ui| {
            ui.heading("Multilanguage Translator");
            ui.label("Word-by-word translation between languages");
            ui.horizontal(|ui| {
                Self::language_picker(ui, "source_lang", "From:", &mut self.session.source_lang);
                if ui.button("🔄 Swap").clicked() {
                    self.session.swap_languages();
                }
                Self::language_picker(ui, "target_lang", "To:", &mut self.session.target_lang);
            });
        });

        egui::TopBottomPanel::bottom("input").show(ctx, |ui| {
            for notice in self.session.notices() {
                ui.label(RichText::new(notice).color(Color32::RED));
            }

            ui.horizontal(|ui| {
                let btn_width = 80.0;
                let text_edit = TextEdit::multiline(&mut self.input)
                    .hint_text("Enter text to translate")
                    .desired_rows(3)
                    .desired_width(ui.available_width() - btn_width);
                ui.add(text_edit);

                let busy = self.in_flight.is_some();
                let btn = ui
                    .add_enabled(!busy, Button::new("Send"))
                    .on_hover_text(if busy {
                        format!(
                            "Translating from {} to {}...",
                            self.session.source_lang, self.session.target_lang
                        )
                    } else {
                        "Translate the entered text".to_owned()
                    });
                if btn.clicked() {
                    self.send(ctx);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ScrollArea::vertical()
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for message in self.session.transcript() {
                        let (layout, fill, text_color) = match message.role {
                            Role::User => (Layout::right_to_left(Align::TOP), USER_BUBBLE, Color32::WHITE),
                            Role::Assistant => (Layout::left_to_right(Align::TOP), BOT_BUBBLE, Color32::BLACK),
                        };
                        ui.with_layout(layout, |ui| {
                            egui::Frame::group(ui.style()).fill(fill).show(ui, |ui| {
                                ui.set_max_width(ui.available_width() * 0.8);
                                ui.label(RichText::new(&message.content).color(text_color));
                                ui.label(
                                    RichText::new(message.timestamp.format("%H:%M").to_string())
                                        .small()
                                        .color(Color32::GRAY),
                                );
                            });
                        });
                    }
                    if self.in_flight.is_some() {
                        ui.spinner();
                    }
                });
        });
    }
}
