use super::markup::{Markup, escape};
use crate::{
    config::RoutePaths,
    models::{Resource, ResourceDetail, University, UserProfile},
};

// --- Forms ---

fn error_banner(error: Option<&str>) -> Markup {
    let message = match error {
        Some("invalid") => "Email or password is incorrect.",
        Some("taken") => "An account with that email already exists.",
        Some("validation") => "Check the highlighted fields and try again.",
        Some(_) => "Something went wrong. Please try again.",
        None => return Markup::empty(),
    };
    Markup::raw(format!("<p class=\"form-error\" role=\"alert\">{}</p>", escape(message)))
}

pub fn login_form(paths: &RoutePaths, next: Option<&str>, error: Option<&str>) -> Markup {
    let next_field = next
        .map(|n| format!("<input type=\"hidden\" name=\"next\" value=\"{}\">", escape(n)))
        .unwrap_or_default();
    Markup::raw(format!(
        "<form method=\"post\" action=\"{login}\" class=\"auth-form\" id=\"login-form\">\n\
         <h1>Sign in</h1>\n{banner}\n\
         <label>Email <input type=\"email\" name=\"email\" autocomplete=\"email\" required></label>\n\
         <label>Password <input type=\"password\" name=\"password\" autocomplete=\"current-password\" required></label>\n\
         {next_field}\n<button type=\"submit\">Sign in</button>\n\
         <p>No account? <a href=\"{register}\">Register</a></p>\n</form>",
        login = escape(&paths.login),
        register = escape(&paths.register),
        banner = error_banner(error),
    ))
}

pub fn register_form(paths: &RoutePaths, universities: &[University], error: Option<&str>) -> Markup {
    let options: Markup = universities
        .iter()
        .map(|u| {
            Markup::raw(format!(
                "<option value=\"{}\">{}</option>",
                u.id,
                escape(&u.name)
            ))
        })
        .collect();
    Markup::raw(format!(
        "<form method=\"post\" action=\"{register}\" class=\"auth-form\" id=\"register-form\">\n\
         <h1>Create an account</h1>\n{banner}\n\
         <label>Email <input type=\"email\" name=\"email\" autocomplete=\"email\" required></label>\n\
         <label>Password <input type=\"password\" name=\"password\" autocomplete=\"new-password\" minlength=\"8\" required></label>\n\
         <label>University <select name=\"university_id\"><option value=\"\">Not listed</option>{options}</select></label>\n\
         <button type=\"submit\">Register</button>\n\
         <p>Already registered? <a href=\"{login}\">Sign in</a></p>\n</form>",
        register = escape(&paths.register),
        login = escape(&paths.login),
        banner = error_banner(error),
    ))
}

// --- Dashboard widgets ---

pub fn profile_widget(profile: &UserProfile) -> Markup {
    let university = profile
        .university
        .as_ref()
        .map(|u| escape(&u.name))
        .unwrap_or_else(|| "No university selected".to_string());
    Markup::raw(format!(
        "<div class=\"widget profile\">\n<h2>Profile</h2>\n<dl>\n\
         <dt>Email</dt><dd>{}</dd>\n<dt>Role</dt><dd>{}</dd>\n<dt>University</dt><dd>{}</dd>\n\
         </dl>\n<form method=\"post\" action=\"/logout\"><button type=\"submit\">Sign out</button></form>\n</div>",
        escape(&profile.email),
        escape(&profile.role),
        university,
    ))
}

pub fn resource_list_widget(heading: &str, resources: &[Resource], paths: &RoutePaths) -> Markup {
    let body = if resources.is_empty() {
        Markup::raw("<p class=\"empty\">Nothing here yet.</p>")
    } else {
        let items: Markup = resources
            .iter()
            .map(|r| {
                Markup::raw(format!(
                    "<li><a href=\"{}\">{}</a> <span class=\"meta\">{} · {}</span></li>",
                    escape(&paths.resource(r.resource_id)),
                    escape(&r.title),
                    escape(&r.course_code),
                    escape(&r.semester),
                ))
            })
            .collect();
        Markup::raw(format!("<ul class=\"resources\">{items}</ul>"))
    };
    Markup::raw(format!(
        "<div class=\"widget resources\">\n<h2>{}</h2>\n{}\n</div>",
        escape(heading),
        body
    ))
}

pub fn resource_detail(detail: &ResourceDetail, university: Option<&University>) -> Markup {
    let r = &detail.resource;
    let optional = |label: &str, value: Option<String>| {
        value
            .map(|v| format!("<dt>{}</dt><dd>{}</dd>", escape(label), escape(&v)))
            .unwrap_or_default()
    };
    let size = r.file_size.map(human_size);
    Markup::raw(format!(
        "<article class=\"resource\" data-resource-id=\"{id}\">\n<h1>{title}</h1>\n{description}\n<dl>\n\
         <dt>Course</dt><dd>{course}</dd>\n<dt>Semester</dt><dd>{semester}</dd>\n\
         {university}{kind}{mime}{size}\
         <dt>Uploaded</dt><dd>{uploaded}</dd>\n<dt>Views</dt><dd>{views}</dd>\n</dl>\n\
         <a class=\"download\" href=\"{url}\" rel=\"noopener\">Open file</a>\n</article>",
        id = r.resource_id,
        title = escape(&r.title),
        description = r
            .description
            .as_deref()
            .map(|d| format!("<p class=\"description\">{}</p>", escape(d)))
            .unwrap_or_default(),
        course = escape(&r.course_code),
        semester = escape(&r.semester),
        university = optional("University", university.map(|u| u.name.clone())),
        kind = optional("Type", r.resource_type.clone()),
        mime = optional("Format", r.mime_type.clone()),
        size = optional("Size", size),
        uploaded = r.uploaded_at.format("%Y-%m-%d"),
        views = detail.view_count,
        url = escape(&r.file_url),
    ))
}

fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// --- Skeletons ---
// Same outer structure as the widget they stand in for, no data.

pub fn form_skeleton() -> Markup {
    Markup::raw(
        "<div class=\"auth-form skeleton\" aria-busy=\"true\">\
         <div class=\"line title\"></div><div class=\"line input\"></div>\
         <div class=\"line input\"></div><div class=\"line button\"></div></div>",
    )
}

pub fn profile_skeleton() -> Markup {
    Markup::raw(
        "<div class=\"widget profile skeleton\" aria-busy=\"true\">\
         <div class=\"line title\"></div><div class=\"line\"></div><div class=\"line\"></div>\
         <div class=\"line\"></div></div>",
    )
}

pub fn resource_list_skeleton(rows: usize) -> Markup {
    let lines = "<li class=\"line\"></li>".repeat(rows);
    Markup::raw(format!(
        "<div class=\"widget resources skeleton\" aria-busy=\"true\">\
         <div class=\"line title\"></div><ul class=\"resources\">{lines}</ul></div>"
    ))
}

pub fn resource_skeleton() -> Markup {
    Markup::raw(
        "<article class=\"resource skeleton\" aria-busy=\"true\">\
         <div class=\"line title\"></div><div class=\"line\"></div><div class=\"line\"></div></article>",
    )
}

// --- Errors ---

pub fn error_panel(status: u16, message: &str) -> Markup {
    Markup::raw(format!(
        "<div class=\"error-page\" role=\"alert\"><h1>{status}</h1><p>{}</p></div>",
        escape(message)
    ))
}
