use crate::analysis::{self, AnalysisResponse};
use crate::backend::{Backend, LocalBackend, RemoteBackend};
use crate::commands::{Command, MealCommand, ProfileCommand, WaterCommand};
use crate::config::{BackendConfig, Config};
use crate::day::{Clock, DayKey, SystemClock};
use crate::event::{Event, EventHandler};
use crate::hooks::{HydrationHook, MealsHook, ProfileHook};
use crate::models::{MealPatch, NewMeal, ProfileUpdate, LARGE_CUP_ML, SMALL_CUP_ML};
use crate::query::MutationResult;
use crate::render;
use crate::session::Session;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How often `watch` checks whether the day rolled over
const TICK_RATE: Duration = Duration::from_secs(30);

/// Main application state
pub struct App {
  session: Session,

  /// Day the commands act on
  selected: DayKey,

  /// Whether `selected` follows the clock (no --date given)
  follow_today: bool,
}

impl App {
  pub fn new(config: &Config, date: Option<DayKey>) -> Result<Self> {
    let backend = match &config.backend {
      BackendConfig::Local { path, images_dir } => {
        Backend::local(LocalBackend::open(path.as_deref(), images_dir.as_deref())?)
      }
      BackendConfig::Remote { url } => Backend::remote(RemoteBackend::new(url)?),
    };

    let session = Session::start(config.user_id, backend, &config.cache, Arc::new(SystemClock));
    Ok(Self::with_session(session, date))
  }

  pub fn with_session(session: Session, date: Option<DayKey>) -> Self {
    Self {
      selected: date.unwrap_or_else(|| session.today()),
      follow_today: date.is_none(),
      session,
    }
  }

  /// Run one command, returning what should be printed.
  pub async fn run(&mut self, command: Command) -> Result<String> {
    debug!(?command, day = %self.selected, "running command");
    let output = match command {
      Command::Day => self.day().await,
      Command::Week => self.week().await,
      Command::Meal(meal) => self.meal(meal).await?,
      Command::Water(water) => self.water(water).await?,
      Command::Profile(profile) => self.profile(profile).await?,
      Command::Watch => {
        self.watch().await?;
        String::new()
      }
    };
    let stats = self.session.stats();
    debug!(
      meal_days = stats.meal_days.len(),
      water_days = stats.water_days.len(),
      meal_readers = stats.meal_readers,
      water_readers = stats.water_readers,
      "cache state"
    );
    Ok(output)
  }

  /// Timestamp for a record logged on the selected day.
  ///
  /// Today uses the current time; another day gets its local noon.
  fn logged_at(&self) -> Option<DateTime<Utc>> {
    if self.selected == self.session.today() {
      None
    } else {
      Some(self.session.clock().bounds(self.selected).start + ChronoDuration::hours(12))
    }
  }

  // ==========================================================================
  // Views
  // ==========================================================================

  async fn day(&self) -> String {
    let meals = self.session.meals_hook(self.selected).await;
    let water = self.session.hydration_hook(self.selected).await;
    let profile = self.session.profile_hook().await;
    render_day(&meals, &water, &profile)
  }

  async fn week(&self) -> String {
    // Weekly charts read the cache, warmed from today.
    let today = self.session.today();
    let meals = self.session.meals_hook(today).await;
    let water = self.session.hydration_hook(today).await;
    let profile = self.session.profile_hook().await;
    render::week(&meals.weekly_summary(), &water.water_window(), profile.profile())
  }

  // ==========================================================================
  // Meals
  // ==========================================================================

  async fn meal(&self, command: MealCommand) -> Result<String> {
    let mut meals = self.session.meals_hook(self.selected).await;
    match command {
      MealCommand::Add(args) => {
        let meal = self.stamped(args.to_meal());
        let meal = expect_data(meals.add_meal(meal).await)?;
        Ok(format!("Logged {} kcal [{}]\n", meal.calories, meal.id))
      }
      MealCommand::Update { id, fields } => {
        let meal = expect_data(meals.update_meal(id, MealPatch::from(fields)).await)?;
        Ok(format!("Updated meal [{}]: {} kcal\n", meal.id, meal.calories))
      }
      MealCommand::Delete { id } => {
        expect_data(meals.delete_meal(id).await)?;
        Ok(format!("Deleted meal [{}]\n", id))
      }
      MealCommand::Analyze {
        image,
        description,
        save,
      } => {
        let analyzer = self.session.analyzer()?;
        let user_id = self.session.user_id();
        let (response, image_url): (AnalysisResponse, Option<String>) = match image {
          Some(path) => {
            let bytes = tokio::fs::read(&path)
              .await
              .map_err(|e| eyre!("Failed to read image {}: {}", path.display(), e))?;
            let result = analysis::analyze_photo(
              analyzer,
              self.session.images(),
              user_id,
              bytes,
              description.clone(),
            )
            .await?;
            (result.analysis, Some(result.image_url))
          }
          None => {
            let text = description
              .as_deref()
              .ok_or_else(|| eyre!("Give --image or --description"))?;
            (analysis::analyze_text(analyzer, user_id, text).await?, None)
          }
        };

        let mut output = render::analysis(&response);
        if save {
          let meal = self.stamped(response.into_meal(image_url, description));
          let meal = expect_data(meals.add_meal(meal).await)?;
          output.push_str(&format!("Logged [{}]\n", meal.id));
        }
        Ok(output)
      }
    }
  }

  fn stamped(&self, meal: NewMeal) -> NewMeal {
    match self.logged_at() {
      Some(at) => meal.at(at),
      None => meal,
    }
  }

  // ==========================================================================
  // Water
  // ==========================================================================

  async fn water(&self, command: WaterCommand) -> Result<String> {
    let mut water = self.session.hydration_hook(self.selected).await;
    let logged_at = self.logged_at();
    let result = match command {
      WaterCommand::Add { ml } => match logged_at {
        Some(at) => water.add_water_at(ml, at).await,
        None => water.add_water(ml).await,
      },
      WaterCommand::Small => match logged_at {
        Some(at) => water.add_water_at(SMALL_CUP_ML, at).await,
        None => water.add_small_cup().await,
      },
      WaterCommand::Large => match logged_at {
        Some(at) => water.add_water_at(LARGE_CUP_ML, at).await,
        None => water.add_large_cup().await,
      },
      WaterCommand::Delete { id } => {
        expect_data(water.delete_water_log(id).await)?;
        return Ok(format!(
          "Deleted water log [{}]. Total {} ml\n",
          id,
          water.total_water()
        ));
      }
    };
    let log = expect_data(result)?;
    Ok(format!(
      "Logged {} ml [{}]. Total {} ml\n",
      log.amount_ml,
      log.id,
      water.total_water()
    ))
  }

  // ==========================================================================
  // Profile
  // ==========================================================================

  async fn profile(&self, command: ProfileCommand) -> Result<String> {
    let mut profile = self.session.profile_hook().await;
    match command {
      ProfileCommand::Show => match (profile.profile(), profile.error()) {
        (Some(p), _) => Ok(render::profile(p)),
        (None, Some(e)) => Err(eyre!("Failed to load settings: {}", e)),
        (None, None) => Err(eyre!("Settings unavailable")),
      },
      ProfileCommand::Set(args) => {
        let updated = expect_data(profile.update_profile(ProfileUpdate::from(args)).await)?;
        Ok(render::profile(&updated))
      }
    }
  }

  // ==========================================================================
  // Watch
  // ==========================================================================

  async fn watch(&mut self) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);
    let mut meals = self.session.meals_hook(self.selected).await;
    let mut water = self.session.hydration_hook(self.selected).await;
    let mut profile = self.session.profile_hook().await;

    if !self.session.has_realtime() {
      info!("backend has no change feed; watch only sees changes made here");
    }
    println!("{}", render_day(&meals, &water, &profile));

    loop {
      tokio::select! {
        event = events.next() => match event {
          Some(Event::Tick) => {
            let today = self.session.today();
            if !self.follow_today || today == self.selected {
              continue;
            }
            info!(%today, "day rolled over");
            self.selected = today;
            meals.set_date(today).await;
            water.set_date(today).await;
          }
          Some(Event::Interrupt) | None => break,
        },
        _ = meals.changed() => {
          meals.sync().await;
        }
        _ = water.changed() => {
          water.sync().await;
        }
        _ = profile.changed() => {
          profile.sync().await;
        }
      }
      println!("{}", render_day(&meals, &water, &profile));
    }

    self.session.clear_all();
    Ok(())
  }
}

fn render_day(meals: &MealsHook, water: &HydrationHook, profile: &ProfileHook) -> String {
  let summary = meals.daily_summary().with_water(water.records());
  let mut out = render::day(
    meals.selected_day(),
    &summary,
    meals.records(),
    water.records(),
    profile.profile(),
  );
  for error in [meals.error(), water.error(), profile.error()].into_iter().flatten() {
    out.push_str(&format!("\n! {}\n", error));
  }
  out
}

/// Turn a reader mutation result into a `Result` for the CLI.
fn expect_data<T>(result: MutationResult<T>) -> Result<T> {
  result
    .into_result()?
    .ok_or_else(|| eyre!("Backend returned no data"))
}
