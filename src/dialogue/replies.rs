//! Outbound message texts and match-list formatting.

use crate::dialogue::model::UserProfile;
use crate::transport::ChoiceOption;
use crate::validation::{MAX_AGE, MIN_AGE};

pub const WELCOME: &str = "👋 Привет! Я бот для поиска партнёров по обучению.\n\n\
Что я умею:\n\
• Помогаю найти людей для совместного изучения предметов\n\
• Подбираю партнёров по возрасту, стране проживания или интересующим предметам\n\
• Помогаю установить контакт с потенциальными учебными партнёрами\n\n\
Доступные команды:\n\
/register - Зарегистрироваться\n\
/search - Искать партнёров по обучению\n\
/update - Изменить профиль\n\n\
Для начала работы пройдите регистрацию с помощью команды /register 📝";

pub const UNKNOWN_INPUT: &str =
    "Я понимаю команды /start, /register, /search и /update. С чего начнём?";

// ── Registration ────────────────────────────────────────────────────

pub const ALREADY_REGISTERED: &str =
    "Вы уже зарегистрированы! Вы можете искать партнёров с помощью /search.";
pub const ASK_LOCATION: &str =
    "Отлично! Давайте создадим ваш профиль. В какой стране вы живете?";
pub const INVALID_LOCATION: &str =
    "❌ Указанная страна не найдена. Пожалуйста, проверьте правильность написания.";
pub const ASK_LANGUAGE: &str = "На каком языке вы предпочитаете общаться?";
pub const INVALID_LANGUAGE: &str =
    "❌ Указанный язык не поддерживается. Пожалуйста, проверьте правильность написания.";
pub const ASK_GENDER: &str = "Укажите ваш пол:";
pub const ASK_SUBJECTS: &str =
    "🎓 Какие предметы вы хотите изучать? Перечислите их через запятую.";
pub const INVALID_SUBJECTS: &str =
    "❌ Один или несколько предметов не найдены. Пожалуйста, проверьте правильность написания.";
pub const REGISTERED: &str =
    "✅ Профиль успешно создан! Теперь вы можете искать партнёров с помощью команды /search.";

pub fn ask_age() -> String {
    format!("Укажите ваш возраст (число от {MIN_AGE} до {MAX_AGE}):")
}

pub fn invalid_age() -> String {
    format!("❌ Пожалуйста, введите корректный возраст (число от {MIN_AGE} до {MAX_AGE}).")
}

pub fn gender_options() -> Vec<ChoiceOption> {
    vec![
        ChoiceOption::new("Мужской", "gender_male"),
        ChoiceOption::new("Женский", "gender_female"),
    ]
}

// ── Update ──────────────────────────────────────────────────────────

pub const NOT_REGISTERED: &str =
    "❌ Вы не зарегистрированы! Пожалуйста, сначала используйте команду /register.";
pub const CHOOSE_FIELD: &str = "Выберите, что хотите изменить:";
pub const ASK_NEW_LOCATION: &str = "Введите новую страну проживания:";
pub const ASK_NEW_LANGUAGE: &str = "Введите новый язык общения:";
pub const ASK_NEW_SUBJECTS: &str = "Введите новый список предметов через запятую:";
pub const LOCATION_UPDATED: &str = "✅ Страна проживания успешно обновлена!";
pub const LANGUAGE_UPDATED: &str = "✅ Язык общения успешно обновлен!";
pub const AGE_UPDATED: &str = "✅ Возраст успешно обновлен!";
pub const SUBJECTS_UPDATED: &str = "✅ Список предметов успешно обновлен!";

pub fn ask_new_age() -> String {
    format!("Введите ваш новый возраст (число от {MIN_AGE} до {MAX_AGE}):")
}

pub fn profile_summary(profile: &UserProfile) -> String {
    format!(
        "📋 Ваш текущий профиль:\n\
         📍 Страна: {}\n\
         🗣️ Язык: {}\n\
         📅 Возраст: {}\n\
         📚 Предметы: {}\n\n\
         Выберите, что хотите изменить:",
        profile.location,
        profile.language,
        profile.age,
        subjects_line(profile),
    )
}

pub fn field_options() -> Vec<ChoiceOption> {
    vec![
        ChoiceOption::new("Страна", "update_location"),
        ChoiceOption::new("Язык", "update_language"),
        ChoiceOption::new("Возраст", "update_age"),
        ChoiceOption::new("Предметы", "update_subjects"),
    ]
}

// ── Search ──────────────────────────────────────────────────────────

pub const CHOOSE_CRITERION: &str = "Выберите критерий поиска:";
pub const ASK_SEARCH_LOCATION: &str = "Введите страну для поиска:";
pub const ASK_SEARCH_SUBJECTS: &str = "Введите интересующие предметы через запятую:";
pub const NO_MATCHES: &str = "К сожалению, подходящих партнеров не найдено.";

pub fn ask_search_age() -> String {
    format!("Введите возраст для поиска (число от {MIN_AGE} до {MAX_AGE}):")
}

pub fn criterion_options() -> Vec<ChoiceOption> {
    vec![
        ChoiceOption::new("По возрасту", "search_age"),
        ChoiceOption::new("По стране", "search_location"),
        ChoiceOption::new("По предметам", "search_subjects"),
    ]
}

pub fn format_matches(matches: &[UserProfile]) -> String {
    let mut response = String::from("Найдены следующие партнеры:\n\n");
    for profile in matches {
        response.push_str("🎓 Партнер\n");
        response.push_str(&format!("Страна: {}\n", profile.location));
        response.push_str(&format!("Язык: {}\n", profile.language));
        response.push_str(&format!("Возраст: {}\n", profile.age));
        response.push_str(&format!("Предметы: {}\n", subjects_line(profile)));
        match &profile.display_name {
            Some(name) => response.push_str(&format!("Профиль: @{name}\n")),
            None => response.push_str(&format!("ID: {}\n", profile.external_id)),
        }
        response.push('\n');
    }
    response
}

fn subjects_line(profile: &UserProfile) -> String {
    profile
        .subjects
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}
