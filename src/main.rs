// lscvmc: a compiler targeting the LSCVM stack machine.
//
// Copyright (C) 2020  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::{
    env::args,
    fs,
    io::{stdin, Read},
    process::exit,
};

use serde_json::json;

use lscvmc::heap::{self, Layout};
use lscvmc::translator::Translator;

fn usage() -> ! {
    eprintln!("usage: lscvmc [--layout FILE.ron] [--functions] [SOURCE | -]");
    exit(2);
}

fn fail(message: String) -> ! {
    eprintln!("lscvmc: {}", message);
    exit(1);
}

fn main() {
    let mut layout = Layout::default();
    let mut dump_functions = false;
    let mut path: Option<String> = None;

    let mut argv = args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--layout" => match argv.next() {
                Some(p) => match heap::load_layout(&p) {
                    Ok(l) => layout = l,
                    Err(e) => fail(e.to_string()),
                },
                None => usage(),
            },
            "--functions" => dump_functions = true,
            "-" => path = None,
            _ if arg.starts_with("--") => usage(),
            _ => path = Some(arg),
        }
    }

    let source = match path {
        Some(p) => match fs::read_to_string(&p) {
            Ok(s) => s,
            Err(e) => fail(format!("{}: {}", p, e)),
        },
        None => {
            let mut s = String::new();
            if let Err(e) = stdin().read_to_string(&mut s) {
                fail(format!("stdin: {}", e));
            }
            s
        }
    };

    let mut translator = Translator::new(layout);
    match translator.translate(&source) {
        Ok(code) => {
            if dump_functions {
                let table: Vec<_> = translator
                    .functions()
                    .iter()
                    .map(|f| json!({
                        "name": f.name,
                        "offset": f.offset,
                        "length": f.opcodes.len(),
                    }))
                    .collect();
                eprintln!("{}", serde_json::Value::Array(table));
            }
            println!("{}", code);
        }
        Err(e) => fail(e.to_string()),
    }
}
