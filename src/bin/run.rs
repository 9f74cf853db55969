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

// Feed a compiled opcode string to the reference interpreter and
// stream whatever it prints to stdout.

use std::{
    env::args,
    fs,
    io::{stdin, stdout, Read},
    process::exit,
};

use lscvmc::vm;

fn fail(message: String) -> ! {
    eprintln!("lscvm-run: {}", message);
    exit(1);
}

fn main() {
    let program = match args().nth(1).filter(|p| p != "-") {
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

    // Line endings are editor artifacts, not instructions. Spaces
    // stay: space is an opcode.
    let program = program.trim_end_matches(|c| c == '\n' || c == '\r');

    let mut out = stdout();
    if let Err(e) = vm::run(program, &mut out) {
        fail(e.to_string());
    }
}
