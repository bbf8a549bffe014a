use std::fs::File;
use std::io::{self, BufReader};
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use eframe::egui;
use lander_plot::derive::{self, ENG_GIMBAL, ENG_GIMBAL_VEL, MASS};
use lander_plot::{
    align_zero, ingest_lines, padded_range, rad2deg, CurvePair, Dataset, FigureSpec, Panel,
    TwinAxis,
};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

const FIG_WIDTH: u32 = 1280;
const FIG_HEIGHT: u32 = 960;

const DARKBLUE: RGBColor = RGBColor(0, 0, 139);
const DARKRED: RGBColor = RGBColor(139, 0, 0);
/// Left/right axis label and curve families, matching plotting order.
const AXIS_COLORS: [RGBColor; 2] = [BLUE, RED];
const CURVE_COLORS: [[RGBColor; 2]; 2] = [[BLUE, DARKBLUE], [RED, DARKRED]];
const HLINE_COLORS: [RGBColor; 2] = [RGBColor(176, 196, 222), RGBColor(240, 128, 128)];
/// Shared-axis palette, assigned by plotting order.
const SINGLE_AXIS_PALETTE: [RGBColor; 4] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
];

#[derive(Parser, Debug)]
#[command(author, version, about = "Render lander guidance telemetry comparison charts", long_about = None)]
struct Cli {
    /// Telemetry log to read instead of stdin
    #[arg(long, value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output PNG for the control/attitude figure
    #[arg(long, default_value = "output_ctr_ang.png", value_hint = ValueHint::FilePath)]
    ctr_ang: PathBuf,

    /// Output PNG for the navigation figure
    #[arg(long, default_value = "output_nav.png", value_hint = ValueHint::FilePath)]
    nav: PathBuf,

    /// Skip the interactive viewer window
    #[arg(long, action = ArgAction::SetTrue)]
    no_show: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let mut log = match cli.input.as_ref() {
        Some(path) => {
            info!("Reading telemetry from {}", path.display());
            let file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            ingest_lines(BufReader::new(file))?
        }
        None => {
            info!("Reading telemetry from stdin");
            let stdin = io::stdin();
            ingest_lines(stdin.lock())?
        }
    };

    if log.spacecraft.samples() == 0 || log.sim.samples() == 0 {
        bail!(
            "no telemetry records to plot (spacecraft: {}, sim: {})",
            log.spacecraft.samples(),
            log.sim.samples()
        );
    }

    derive::process(&mut log.spacecraft)?;
    derive::process(&mut log.sim)?;
    log.spacecraft.validate()?;
    log.sim.validate()?;

    let xs = derive::time_axis(&log.spacecraft)?;
    info!("Read and parsed all data, plotting - len={}", xs.len());

    let figures = vec![
        (build_ctr_ang_figure(&log.spacecraft, &log.sim)?, cli.ctr_ang),
        (build_nav_figure(&log.spacecraft, &log.sim)?, cli.nav),
    ];

    // Every figure is validated against the shared time axis before the
    // first file is written, so a mismatch leaves no partial output.
    for (spec, _) in &figures {
        spec.check_lengths(xs.len())?;
    }

    let mut rendered = Vec::with_capacity(figures.len());
    for (spec, path) in figures {
        let figure = render_figure_guard(&spec, &xs)?;
        info!("Saving plot to {}", path.display());
        save_png(&figure, &path)?;
        rendered.push(figure);
    }

    if !cli.no_show {
        info!("Plotted all data, showing");
        show_viewer(rendered)?;
    }

    Ok(())
}

//
// Figure composition
//

fn channel_pair(sc: &Dataset, sim: &Dataset, name: &str) -> Result<CurvePair> {
    Ok(CurvePair::new(
        sc.channel(name)?.to_vec(),
        sim.channel(name)?.to_vec(),
    ))
}

fn derived_pair(sc: &Dataset, sim: &Dataset, name: &str) -> Result<CurvePair> {
    Ok(CurvePair::new(
        sc.derived(name)?.to_vec(),
        sim.derived(name)?.to_vec(),
    ))
}

fn deg(pair: CurvePair) -> CurvePair {
    CurvePair::new(rad2deg(&pair.estimate), rad2deg(&pair.truth))
}

fn twin(label: &str, pair: CurvePair, hline: Option<f64>) -> TwinAxis {
    TwinAxis {
        label: label.to_string(),
        pair,
        hline,
    }
}

fn build_ctr_ang_figure(sc: &Dataset, sim: &Dataset) -> Result<FigureSpec> {
    Ok(FigureSpec {
        title: "Control & attitude".to_string(),
        panels: vec![
            Panel::TwinAxis {
                axes: vec![
                    twin("eng_throttle (0-1)", channel_pair(sc, sim, "eng_throttle")?, None),
                    twin("mass (kg)", derived_pair(sc, sim, MASS)?, None),
                ],
                align_zero: false,
            },
            Panel::TwinAxis {
                axes: vec![
                    twin("gimbal pos (deg)", deg(derived_pair(sc, sim, ENG_GIMBAL)?), Some(0.0)),
                    twin(
                        "gimbal vel (deg/sec)",
                        deg(derived_pair(sc, sim, ENG_GIMBAL_VEL)?),
                        Some(0.0),
                    ),
                ],
                align_zero: true,
            },
            Panel::TwinAxis {
                axes: vec![
                    twin("ang vel (deg/sec)", deg(channel_pair(sc, sim, "ang_vel")?), Some(0.0)),
                    twin("ang pos (deg)", deg(channel_pair(sc, sim, "ang_pos")?), Some(90.0)),
                ],
                align_zero: false,
            },
        ],
    })
}

fn build_nav_figure(sc: &Dataset, sim: &Dataset) -> Result<FigureSpec> {
    let accelerations = [
        ("acc_thrust (m/s^2)", "acc_thrust"),
        ("acc_atm (m/s^2)", "acc_atm"),
        ("acc_gravity (m/s^2)", "acc_gravity"),
        ("acc_centrifugal (m/s^2)", "acc_centrifugal"),
    ];
    let mut curves = Vec::with_capacity(accelerations.len());
    for (label, name) in accelerations {
        curves.push((label.to_string(), channel_pair(sc, sim, name)?));
    }

    Ok(FigureSpec {
        title: "Navigation".to_string(),
        panels: vec![
            Panel::SingleAxis(curves),
            Panel::TwinAxis {
                axes: vec![
                    twin("acc x (m/s^2)", channel_pair(sc, sim, "acc_x")?, Some(0.0)),
                    twin("acc y (m/s^2)", channel_pair(sc, sim, "acc_y")?, Some(0.0)),
                ],
                align_zero: true,
            },
            Panel::TwinAxis {
                axes: vec![
                    twin("vel x (m/s)", channel_pair(sc, sim, "vel_x")?, Some(0.0)),
                    twin("vel y (m/s)", channel_pair(sc, sim, "vel_y")?, Some(0.0)),
                ],
                align_zero: false,
            },
            Panel::TwinAxis {
                axes: vec![
                    twin("pos x (m)", channel_pair(sc, sim, "pos_x")?, Some(0.0)),
                    twin("pos y (m)", channel_pair(sc, sim, "pos_y")?, Some(0.0)),
                ],
                align_zero: false,
            },
        ],
    })
}

//
// Rendering
//

struct RenderedFigure {
    title: String,
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

fn axis_font() -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal)
}

/// Horizontal extent of a panel. A one-sample stream has no time span, so
/// the range widens to a unit interval to keep the chart drawable.
fn x_range(xs: &[f64]) -> (f64, f64) {
    let (x0, x1) = (xs[0], xs[xs.len() - 1]);
    if x1 - x0 < f64::EPSILON {
        (x0 - 0.5, x0 + 0.5)
    } else {
        (x0, x1)
    }
}

fn tick_label(value: &f64) -> String {
    if value.abs() >= 100.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

/// The font backend can panic instead of erroring on broken system fonts;
/// surface that as a regular error so the exit path stays uniform.
fn render_figure_guard(spec: &FigureSpec, xs: &[f64]) -> Result<RenderedFigure> {
    panic::catch_unwind(panic::AssertUnwindSafe(|| render_figure(spec, xs)))
        .map_err(|_| anyhow!("plotting backend panicked"))?
}

fn render_figure(spec: &FigureSpec, xs: &[f64]) -> Result<RenderedFigure> {
    let mut rgb = vec![0u8; (FIG_WIDTH * FIG_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (FIG_WIDTH, FIG_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE)?;
        let areas = root.split_evenly((spec.panels.len(), 1));
        for (area, panel) in areas.iter().zip(&spec.panels) {
            match panel {
                Panel::SingleAxis(curves) => draw_single_axis(area, xs, curves)?,
                Panel::TwinAxis { axes, align_zero } => {
                    draw_twin_axis(area, xs, axes, *align_zero)?
                }
            }
        }
        root.present()?;
    }
    Ok(RenderedFigure {
        title: spec.title.clone(),
        width: FIG_WIDTH,
        height: FIG_HEIGHT,
        rgb,
    })
}

fn draw_single_axis<DB>(
    area: &DrawingArea<DB, Shift>,
    xs: &[f64],
    curves: &[(String, CurvePair)],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x0, x1) = x_range(xs);
    let series: Vec<&[f64]> = curves
        .iter()
        .flat_map(|(_, pair)| [pair.estimate.as_slice(), pair.truth.as_slice()])
        .collect();
    let (y0, y1) = padded_range(&series, None);

    let mut chart = panel_builder(area).build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .bold_line_style(&TRANSPARENT)
        .x_label_formatter(&|v| format!("{v:.0}"))
        .y_label_formatter(&tick_label)
        .label_style(axis_font().color(&BLACK.mix(0.85)))
        .draw()?;

    for (i, (label, pair)) in curves.iter().enumerate() {
        let color = SINGLE_AXIS_PALETTE[i % SINGLE_AXIS_PALETTE.len()];
        chart
            .draw_series(LineSeries::new(
                xs.iter().copied().zip(pair.estimate.iter().copied()),
                color.stroke_width(2),
            ))?
            .label(label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
        chart.draw_series(LineSeries::new(
            xs.iter().copied().zip(pair.truth.iter().copied()),
            color.mix(0.45).stroke_width(2),
        ))?;
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(axis_font().color(&BLACK))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    Ok(())
}

fn panel_builder<'a, 'b, DB: DrawingBackend>(
    area: &'a DrawingArea<DB, Shift>,
) -> ChartBuilder<'a, 'b, DB> {
    let mut builder = ChartBuilder::on(area);
    builder
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Right, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 30);
    builder
}

fn draw_twin_axis<DB>(
    area: &DrawingArea<DB, Shift>,
    xs: &[f64],
    axes: &[TwinAxis],
    align: bool,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x0, x1) = x_range(xs);
    let mut ranges: Vec<(f64, f64)> = axes
        .iter()
        .map(|axis| {
            padded_range(
                &[axis.pair.estimate.as_slice(), axis.pair.truth.as_slice()],
                axis.hline,
            )
        })
        .collect();
    if align && ranges.len() == 2 {
        let (left, right) = align_zero(ranges[0], ranges[1]);
        ranges[0] = left;
        ranges[1] = right;
    }

    if axes.len() == 2 {
        let mut chart = panel_builder(area)
            .build_cartesian_2d(x0..x1, ranges[0].0..ranges[0].1)?
            .set_secondary_coord(x0..x1, ranges[1].0..ranges[1].1);

        chart
            .configure_mesh()
            .light_line_style(&TRANSPARENT)
            .bold_line_style(&TRANSPARENT)
            .x_label_formatter(&|v| format!("{v:.0}"))
            .y_label_formatter(&tick_label)
            .y_desc(axes[0].label.as_str())
            .axis_desc_style(axis_font().color(&AXIS_COLORS[0]))
            .label_style(axis_font().color(&BLACK.mix(0.85)))
            .draw()?;

        chart
            .configure_secondary_axes()
            .y_desc(axes[1].label.as_str())
            .axis_desc_style(axis_font().color(&AXIS_COLORS[1]))
            .label_style(axis_font().color(&AXIS_COLORS[1]))
            .y_label_formatter(&tick_label)
            .draw()?;

        let pair = &axes[0].pair;
        chart.draw_series(LineSeries::new(
            xs.iter().copied().zip(pair.estimate.iter().copied()),
            CURVE_COLORS[0][0].stroke_width(2),
        ))?;
        chart.draw_series(LineSeries::new(
            xs.iter().copied().zip(pair.truth.iter().copied()),
            CURVE_COLORS[0][1].stroke_width(2),
        ))?;
        if let Some(h) = axes[0].hline {
            chart.draw_series(LineSeries::new(
                [(x0, h), (x1, h)],
                &HLINE_COLORS[0],
            ))?;
        }

        let pair = &axes[1].pair;
        chart.draw_secondary_series(LineSeries::new(
            xs.iter().copied().zip(pair.estimate.iter().copied()),
            CURVE_COLORS[1][0].stroke_width(2),
        ))?;
        chart.draw_secondary_series(LineSeries::new(
            xs.iter().copied().zip(pair.truth.iter().copied()),
            CURVE_COLORS[1][1].stroke_width(2),
        ))?;
        if let Some(h) = axes[1].hline {
            chart.draw_secondary_series(LineSeries::new(
                [(x0, h), (x1, h)],
                &HLINE_COLORS[1],
            ))?;
        }
    } else {
        let axis = &axes[0];
        let mut chart = panel_builder(area).build_cartesian_2d(x0..x1, ranges[0].0..ranges[0].1)?;

        chart
            .configure_mesh()
            .light_line_style(&TRANSPARENT)
            .bold_line_style(&TRANSPARENT)
            .x_label_formatter(&|v| format!("{v:.0}"))
            .y_label_formatter(&tick_label)
            .y_desc(axis.label.as_str())
            .axis_desc_style(axis_font().color(&AXIS_COLORS[0]))
            .label_style(axis_font().color(&BLACK.mix(0.85)))
            .draw()?;

        chart.draw_series(LineSeries::new(
            xs.iter().copied().zip(axis.pair.estimate.iter().copied()),
            CURVE_COLORS[0][0].stroke_width(2),
        ))?;
        chart.draw_series(LineSeries::new(
            xs.iter().copied().zip(axis.pair.truth.iter().copied()),
            CURVE_COLORS[0][1].stroke_width(2),
        ))?;
        if let Some(h) = axis.hline {
            chart.draw_series(LineSeries::new(
                [(x0, h), (x1, h)],
                &HLINE_COLORS[0],
            ))?;
        }
    }

    Ok(())
}

fn save_png(figure: &RenderedFigure, path: &Path) -> Result<()> {
    image::save_buffer(
        path,
        &figure.rgb,
        figure.width,
        figure.height,
        image::ExtendedColorType::Rgb8,
    )
    .with_context(|| format!("failed to write {}", path.display()))
}

//
// Interactive viewer
//

struct Viewer {
    figures: Vec<RenderedFigure>,
    textures: Vec<egui::TextureHandle>,
    active: usize,
}

impl Viewer {
    fn new(figures: Vec<RenderedFigure>) -> Self {
        Self {
            figures,
            textures: Vec::new(),
            active: 0,
        }
    }
}

impl eframe::App for Viewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.textures.is_empty() {
            for figure in &self.figures {
                let size = [figure.width as usize, figure.height as usize];
                let image = egui::ColorImage::from_rgb(size, &figure.rgb);
                self.textures.push(ctx.load_texture(
                    figure.title.clone(),
                    image,
                    egui::TextureOptions::LINEAR,
                ));
            }
        }

        egui::TopBottomPanel::top("figure_tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                for (i, figure) in self.figures.iter().enumerate() {
                    ui.selectable_value(&mut self.active, i, &figure.title);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(texture) = self.textures.get(self.active) {
                egui::ScrollArea::both().show(ui, |ui| {
                    ui.image(texture);
                });
            }
        });
    }
}

fn show_viewer(figures: Vec<RenderedFigure>) -> Result<()> {
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([FIG_WIDTH as f32, FIG_HEIGHT as f32 + 40.0])
        .with_title("Lander telemetry");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "lander_plot",
        options,
        Box::new(move |_cc| Ok(Box::new(Viewer::new(figures)))),
    )
    .map_err(|err| anyhow!("viewer failed: {err}"))
}
