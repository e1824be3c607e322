//! Bot copy, button labels and keyboards.
//!
//! All text is HTML for Telegram's `parse_mode`.

use crate::channels::Keyboard;
use crate::store::UserRecord;

use super::state::BenefitSlot;

pub const GREETING: &str = "<b>Привет</b> 👋\n\n\
Меня зовут Эколина. Я образовательный бот факультета экотехнологий университета ИТМО. \
Давайте познакомимся 🤩\n\
Как тебя зовут? Напиши, пожалуйста, свою фамилию, имя и отчество.";

pub const NAME_INVALID: &str = "Неправильно. Пожалуйста, напишите свою фамилию, имя и отчество \
в формате: Иванов Иван Иванович.";

pub const ASK_FACULTY: &str = "<b>Приятно познакомиться</b> 😊 А теперь укажите свой факультет 👇";

pub const ASK_GROUP: &str = "<b>Класс</b> 👍 Напишите номер своей группы, например G4150 👇";

pub const HOW_CAN_I_HELP: &str = "Итак, чем я могу вам помочь? 🐭";

pub const CHOOSE_ACTION: &str = "Выберите действие:";

pub const ASK_QUESTION: &str = "Задавай свой вопрос, а я пролистаю весь интернет, чтобы ответить 🔎\n\
<i>Мой ИИ может допускать ошибки, поэтому рекомендую проверять важную информацию</i>";

pub const SEARCH_UNAVAILABLE: &str =
    "Извините, но функция поиска ответов временно недоступна. Пожалуйста, попробуйте позже.";

pub const LAB_WELCOME: &str = "<b>Добро пожаловать в мир лабораторных работ</b> 🙂";

pub const LAB_OVERVIEW: &str = "Здесь представлены три лабораторные работы. Ваша задача - выполнить \
их все. После этого, я помогу вам оформить отчет для отправки преподавателю.";

pub const LAB_CHOOSE: &str = "Выберите номер лабораторной работы, используя кнопку ниже. ⬇️";

/// Scripted introduction to lab work №1, sent with pauses in between.
pub const LAB1_INTRO: &[&str] = &[
    "Отлично! Давайте вместе оформим отчет по лабораторной работе №1 📝",
    "Я буду задавать вопросы по очереди. Отвечайте своими словами, коротко и по делу.",
    "В конце я покажу, что получилось, и вы сможете всё проверить и исправить ✍️",
];

pub const LAB1_ASK_OBJECT: &str = "<b>Шаг 1.</b> Опишите объект исследования: что именно вы изучали \
в этой работе? 👇";

pub const CONFIRM_SAVED: &str = "<b>Готово</b> ✅ Ваши ответы сохранены.";

pub const CHANGE_WHICH: &str = "Какой пункт вы хотите изменить? Напишите 1, 2 или 3.";

pub const CHANGE_INVALID: &str = "Пожалуйста, напишите только цифру: 1, 2 или 3.";

pub const NOTIFY_ASK_CONTENT: &str =
    "Что нужно отправить? Введите текст, цифры или отправьте изображение.";

pub const NOTIFY_DENIED: &str = "Эта функция доступна только для преподавателей.";

pub const INTERNAL_ERROR: &str = "Произошла ошибка. Пожалуйста, попробуйте еще раз позже.";

// ── Buttons ─────────────────────────────────────────────────────────

pub const BUTTON_ASK_QUESTION: &str = "🔎 Найти ответ на вопрос";
pub const BUTTON_LAB_HELP: &str = "🔬 Помочь с лабораторными";

/// Inline lab buttons: (callback data, label).
pub const LAB_BUTTONS: &[(&str, &str)] = &[
    ("lab1", "Лабораторная работа №1"),
    ("lab2", "Лабораторная работа №2"),
    ("lab3", "Лабораторная работа №3"),
];

pub const CONFIRM_YES: &str = "confirm_yes";
pub const CONFIRM_NO: &str = "confirm_no";
pub const CONFIRM_ADD: &str = "confirm_add";

/// Persistent main menu.
pub fn main_menu() -> Keyboard {
    Keyboard::Reply(vec![
        vec![BUTTON_ASK_QUESTION.to_string()],
        vec![BUTTON_LAB_HELP.to_string()],
    ])
}

/// One inline button per lab.
pub fn lab_menu() -> Keyboard {
    Keyboard::Inline(
        LAB_BUTTONS
            .iter()
            .map(|(data, label)| vec![(label.to_string(), data.to_string())])
            .collect(),
    )
}

/// Yes / no / add-a-point buttons under the summary.
pub fn confirm_menu() -> Keyboard {
    Keyboard::Inline(vec![
        vec![
            ("✅ Да".to_string(), CONFIRM_YES.to_string()),
            ("✏️ Нет".to_string(), CONFIRM_NO.to_string()),
        ],
        vec![("➕ Добавить пункт".to_string(), CONFIRM_ADD.to_string())],
    ])
}

/// Text replacing the lab menu once a lab is picked.
pub fn lab_selected(label: &str) -> String {
    format!("Вы выбрали {label}.")
}

pub fn benefit_prompt(slot: BenefitSlot) -> String {
    match slot {
        BenefitSlot::First => "<b>Шаг 2.</b> Какую пользу приносит объект исследования? \
Назовите первый пункт 👇"
            .to_string(),
        BenefitSlot::Second => "Назовите второй пункт 👇".to_string(),
        BenefitSlot::Third => "И последний, третий пункт 👇".to_string(),
    }
}

/// Prompt for re-entering one answer.
pub fn benefit_edit_prompt(slot: BenefitSlot) -> String {
    format!("Напишите новый вариант для пункта {} 👇", slot.number())
}

/// Summary of the three benefits, read from the record.
pub fn benefit_summary(record: &UserRecord) -> String {
    let mut lines = vec!["<b>Проверьте ваши ответы:</b>".to_string()];
    for slot in BenefitSlot::ALL {
        let value = record.get(slot.field()).unwrap_or("—");
        lines.push(format!("{}. {}", slot.number(), value));
    }
    lines.push(String::new());
    lines.push("Всё верно?".to_string());
    lines.join("\n")
}

pub fn broadcast_report(sent: usize) -> String {
    format!("Сообщение отправлено {sent} пользователям.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fields;

    #[test]
    fn summary_lists_benefits_in_order() {
        let record: UserRecord = [
            (fields::LAB1_BENEFIT1, "A"),
            (fields::LAB1_BENEFIT2, "B"),
            (fields::LAB1_BENEFIT3, "C"),
        ]
        .into_iter()
        .collect();

        let summary = benefit_summary(&record);
        let a = summary.find("1. A").unwrap();
        let b = summary.find("2. B").unwrap();
        let c = summary.find("3. C").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn summary_marks_missing_answers() {
        let summary = benefit_summary(&UserRecord::new());
        assert!(summary.contains("1. —"));
    }

    #[test]
    fn lab_menu_has_three_buttons() {
        let Keyboard::Inline(rows) = lab_menu() else {
            panic!("lab menu must be inline");
        };
        let data: Vec<_> = rows.iter().flatten().map(|(_, d)| d.as_str()).collect();
        assert_eq!(data, vec!["lab1", "lab2", "lab3"]);
    }

    #[test]
    fn main_menu_uses_button_labels() {
        assert_eq!(
            main_menu(),
            Keyboard::Reply(vec![
                vec![BUTTON_ASK_QUESTION.to_string()],
                vec![BUTTON_LAB_HELP.to_string()]
            ])
        );
    }

    #[test]
    fn broadcast_report_includes_count() {
        assert_eq!(broadcast_report(3), "Сообщение отправлено 3 пользователям.");
    }
}
