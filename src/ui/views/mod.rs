mod login;
mod movie_detail;
mod movie_list;
mod profile;
mod settings;

pub use login::LoginView;
pub use movie_detail::MovieDetailView;
pub use movie_list::{MovieListView, Source};
pub use profile::ProfileView;
pub use settings::SettingsView;
