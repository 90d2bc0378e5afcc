use crate::error::{ConfigurationError, ProgrammingError, Result};
use crate::platform::DisplayPlatform;
use crate::scorer::{ConfigChooser, ConfigurationCandidate};

/// Lifecycle of a [`GraphicsContextSession`]
///
/// ```text
/// Uninitialized → DisplayOpened → ConfigChosen → ContextCreated
///     → SurfaceBound ⇄ SurfaceUnbound → Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsState {
    Uninitialized,
    DisplayOpened,
    ConfigChosen,
    ContextCreated,
    SurfaceBound,
    SurfaceUnbound,
    Destroyed,
}

/// Owns the display connection, the chosen configuration and the rendering
/// context of one engine run, plus the window surface while one is bound.
///
/// All methods must be called from the thread that owns the session (the
/// engine worker thread). Dropping the session releases everything in
/// reverse acquisition order.
pub struct GraphicsContextSession<P: DisplayPlatform> {
    platform: P,
    chooser: ConfigChooser,
    state: GraphicsState,
    display: Option<P::Display>,
    candidates: Vec<(P::Config, ConfigurationCandidate)>,
    chosen: Option<(P::Config, ConfigurationCandidate)>,
    context: Option<P::Context>,
    surface: Option<P::Surface>,
}

impl<P: DisplayPlatform> GraphicsContextSession<P> {
    pub fn new(platform: P, chooser: ConfigChooser) -> Self {
        Self {
            platform,
            chooser,
            state: GraphicsState::Uninitialized,
            display: None,
            candidates: Vec::new(),
            chosen: None,
            context: None,
            surface: None,
        }
    }

    pub fn state(&self) -> GraphicsState {
        self.state
    }

    fn expect_state(&self, operation: &'static str, allowed: &[GraphicsState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ProgrammingError::InvalidGraphicsState {
                operation,
                state: self.state,
            }
            .into())
        }
    }

    /// Opens the display connection and queries every configuration it
    /// advertises.
    pub fn open(&mut self) -> Result<()> {
        self.expect_state("open", &[GraphicsState::Uninitialized])?;

        let display = self.platform.open_display()?;
        let queried = self.platform.query_configs(&display);
        self.display = Some(display);
        self.state = GraphicsState::DisplayOpened;

        let candidates = queried?;
        if candidates.is_empty() {
            return Err(ConfigurationError::NoConfigurations.into());
        }
        log::debug!("Display reports {} configs", candidates.len());
        self.candidates = candidates;

        Ok(())
    }

    /// Ranks the queried configurations and keeps the best one.
    pub fn choose_config(&mut self) -> Result<&ConfigurationCandidate> {
        self.expect_state("choose_config", &[GraphicsState::DisplayOpened])?;

        let descriptors: Vec<ConfigurationCandidate> =
            self.candidates.iter().map(|(_, c)| *c).collect();
        let index = self
            .chooser
            .choose_index(&descriptors)
            .ok_or(ConfigurationError::NoConfigurations)?;

        let chosen = self.candidates.swap_remove(index);
        self.candidates.clear();
        self.state = GraphicsState::ConfigChosen;

        Ok(&self.chosen.insert(chosen).1)
    }

    pub fn create_context(&mut self, api_version: u8) -> Result<()> {
        self.expect_state("create_context", &[GraphicsState::ConfigChosen])?;

        let (display, (config, _)) = match (self.display.as_ref(), self.chosen.as_ref()) {
            (Some(display), Some(chosen)) => (display, chosen),
            _ => unreachable!("display and config always exist once a config is chosen"),
        };
        let context = self.platform.create_context(display, config, api_version)?;
        self.context = Some(context);
        self.state = GraphicsState::ContextCreated;

        Ok(())
    }

    /// Creates a window surface for `window` and makes it current.
    ///
    /// A failure here is fatal to the run; the session stays unbound.
    pub fn bind_surface(&mut self, window: &P::Window) -> Result<()> {
        self.expect_state(
            "bind_surface",
            &[GraphicsState::ContextCreated, GraphicsState::SurfaceUnbound],
        )?;

        let (display, context, (config, _)) = match (
            self.display.as_ref(),
            self.context.as_mut(),
            self.chosen.as_ref(),
        ) {
            (Some(display), Some(context), Some(chosen)) => (display, context, chosen),
            _ => unreachable!("display, context and config always exist once a context is created"),
        };
        let surface = self
            .platform
            .bind_window(display, config, context, window)
            .map_err(|err| {
                log::error!("{err}");
                err
            })?;
        self.surface = Some(surface);
        self.state = GraphicsState::SurfaceBound;

        if let Some(description) = self.platform.describe(display) {
            log::info!("Using {description}");
        }

        Ok(())
    }

    /// Makes nothing current and destroys the window surface, if any.
    ///
    /// Idempotent, and a no-op before a context exists.
    pub fn unbind_surface(&mut self) {
        if let (Some(display), Some(context)) = (self.display.as_ref(), self.context.as_mut()) {
            let surface = self.surface.take();
            self.platform.unbind(display, context, surface);
        }
        if matches!(
            self.state,
            GraphicsState::ContextCreated | GraphicsState::SurfaceBound
        ) {
            self.state = GraphicsState::SurfaceUnbound;
        }
    }

    /// Releases everything acquired so far, in reverse order. Safe to call
    /// from any state, any number of times.
    pub fn destroy(&mut self) {
        if self.state == GraphicsState::Destroyed || self.state == GraphicsState::Uninitialized {
            self.state = GraphicsState::Destroyed;
            return;
        }

        if let Some(display) = self.display.as_ref() {
            if let Some(mut context) = self.context.take() {
                let surface = self.surface.take();
                self.platform.unbind(display, &mut context, surface);
                self.platform.destroy_context(display, context);
            }
        }
        self.chosen = None;
        self.candidates.clear();
        if let Some(display) = self.display.take() {
            self.platform.terminate_display(display);
        }

        self.state = GraphicsState::Destroyed;
    }

    pub fn is_surface_bound(&self) -> bool {
        self.surface.is_some()
    }

    pub fn display(&self) -> Option<&P::Display> {
        self.display.as_ref()
    }

    pub fn config(&self) -> Option<&P::Config> {
        self.chosen.as_ref().map(|(config, _)| config)
    }

    pub fn chosen_candidate(&self) -> Option<&ConfigurationCandidate> {
        self.chosen.as_ref().map(|(_, candidate)| candidate)
    }

    pub fn context(&self) -> Option<&P::Context> {
        self.context.as_ref()
    }

    pub fn surface(&self) -> Option<&P::Surface> {
        self.surface.as_ref()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }
}

impl<P: DisplayPlatform> Drop for GraphicsContextSession<P> {
    fn drop(&mut self) {
        self.destroy();
    }
}
