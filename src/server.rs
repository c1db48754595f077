extern crate querystring;
extern crate std;
extern crate tiny_http;

use std::sync::{Arc, Mutex};

use crate::board;
use crate::poller;
use crate::result;

const PAGE_REFRESH_SECS: u32 = 5;

#[derive(Debug, PartialEq)]
enum Route {
    BoardPage,
    BoardJson,
    RefreshAll,
    RefreshFeed(usize),
    BadRequest(String),
    NotFound,
}

type Response = tiny_http::Response<std::io::Cursor<Vec<u8>>>;

pub fn run_server(port: &str, board: Arc<Mutex<board::Board>>, poller: Arc<poller::Poller>) -> result::EtaResult<()> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| result::make_error(&format!("Couldn't listen on port {}: {}", port, e)))?;

    info!("Running arrivals board HTTP server on port {}", port);
    for request in server.incoming_requests() {
        let route = parse_route(request.method(), request.url(), poller.feed_count());
        debug!("{} {} -> {:?}", request.method(), request.url(), route);

        let response = handle(route, &board, &poller);
        if let Err(err) = request.respond(response) {
            warn!("Error writing response: {}", err);
        }
    }

    return Ok(());
}

fn parse_route(method: &tiny_http::Method, url: &str, feed_count: usize) -> Route {
    if *method != tiny_http::Method::Get {
        return Route::NotFound;
    }

    let mut parts = url.splitn(2, '?');
    let path = parts.next().unwrap_or("");
    let query = parts.next().unwrap_or("");

    match path {
        "/" => return Route::BoardPage,
        "/arrivals.json" => return Route::BoardJson,
        "/refresh" => {},
        _ => return Route::NotFound,
    }

    for (k, v) in querystring::querify(query) {
        if k == "feed" {
            match v.parse::<usize>() {
                Ok(index) if index < feed_count => return Route::RefreshFeed(index),
                _ => return Route::BadRequest(format!("No such feed: '{}'", v)),
            }
        }
    }
    return Route::RefreshAll;
}

fn handle(route: Route, board: &Mutex<board::Board>, poller: &Arc<poller::Poller>) -> Response {
    match route {
        Route::BoardPage => {
            match board.lock() {
                Ok(board) => return with_content_type(
                    tiny_http::Response::from_string(render_html(&board)), "text/html; charset=utf-8"),
                Err(_) => return error_response(500, "board unavailable"),
            }
        },
        Route::BoardJson => {
            let json = match board.lock() {
                Ok(board) => board.to_json(),
                Err(_) => Err(result::make_error("board unavailable")),
            };
            match json {
                Ok(json) => return with_content_type(
                    tiny_http::Response::from_string(json), "application/json"),
                Err(err) => return error_response(500, &format!("{:#}", err)),
            }
        },
        Route::RefreshAll => {
            match poller::claim_refresh(poller) {
                Some(claim) => {
                    std::thread::spawn(move || claim.run_all());
                    return tiny_http::Response::from_string("refreshing all feeds").with_status_code(202);
                },
                None => return already_refreshing(),
            }
        },
        Route::RefreshFeed(index) => {
            match poller::claim_refresh(poller) {
                Some(claim) => {
                    std::thread::spawn(move || claim.run_feed(index));
                    return tiny_http::Response::from_string(format!("refreshing feed {}", index)).with_status_code(202);
                },
                None => return already_refreshing(),
            }
        },
        Route::BadRequest(msg) => return error_response(400, &msg),
        Route::NotFound => return error_response(404, "Not found!"),
    }
}

fn already_refreshing() -> Response {
    return tiny_http::Response::from_string("refresh already in progress").with_status_code(409);
}

fn with_content_type(response: Response, content_type: &str) -> Response {
    match tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        Ok(header) => return response.with_header(header),
        Err(_) => return response,
    }
}

fn error_response(status: u16, msg: &str) -> Response {
    return with_content_type(
        tiny_http::Response::from_string(format!("<h1>{}</h1><p>{}</p>", status, escape_html(msg))),
        "text/html; charset=utf-8")
        .with_status_code(status);
}

fn escape_html(text: &str) -> String {
    return text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;");
}

fn time_cell(class: &str, arrival: &crate::eta::NormalizedArrival) -> String {
    let mut cell = format!("<td class='{}'><span class='minutes'>{}</span>",
                           class, escape_html(&arrival.minutes_label));
    if let Some(ref clock) = arrival.clock_label {
        cell.push_str(&format!("<span class='full-time'>{}</span>", escape_html(clock)));
    }
    cell.push_str("</td>");
    return cell;
}

fn render_html(board: &board::Board) -> String {
    let mut body = format!(
        "<html><head><meta charset='utf-8'><meta http-equiv='refresh' content='{}'><title>Arrivals</title></head><body>",
        PAGE_REFRESH_SECS);

    body.push_str("<table class='arrivals-table'><thead><tr><th>Route</th><th>Next</th><th>Following</th></tr></thead><tbody>");
    for row in board.rows() {
        body.push_str("<tr>");
        body.push_str(&format!(
            "<td class='route-cell'><span class='route-number'>{}</span><span class='station-name'>{}</span></td>",
            escape_html(&row.route_id), escape_html(&row.stop_label)));
        body.push_str(&time_cell("time", &row.first));
        body.push_str(&time_cell("time next-arrival", &row.second));
        body.push_str("</tr>");
    }
    body.push_str("</tbody></table>");

    body.push_str(&format!("<div>Last updated: <span id='last-update'>{}</span></div>",
                           board.last_update().unwrap_or("--:--")));
    body.push_str("</body></html>");
    return body;
}
