use rocket::Route;

mod email;
mod friend;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(friend::routes());
    routes.extend(email::routes());
    routes
}
