// Copyright (c) 2021 Thomas J. Otterson
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

macro_rules! new_ref {
    ($obj:expr $(,)?) => {
        std::rc::Rc::new(std::cell::RefCell::new($obj))
    };
}

macro_rules! clone_ref {
    ($obj:expr $(,)?) => {
        std::rc::Rc::clone(&$obj)
    };
}

macro_rules! pin {
    ($id:expr, $name:expr, $bits:expr, $mode:expr $(,)?) => {
        $crate::components::pin::Pin::new($id, $name, $bits, $mode)
    };
}

macro_rules! state {
    ($pin:expr $(,)?) => {
        $pin.borrow().state()
    };
}

macro_rules! write_state {
    ($pin:expr, $state:expr $(,)?) => {
        $pin.borrow_mut().write($state)
    };
}

macro_rules! value {
    ($pin:expr $(,)?) => {
        $crate::state::bit_states($pin.borrow().state())
    };
}

macro_rules! high {
    ($pin:expr $(,)?) => {
        $pin.borrow().high()
    };
}

macro_rules! low {
    ($pin:expr $(,)?) => {
        $pin.borrow().low()
    };
}

macro_rules! floating {
    ($pin:expr $(,)?) => {
        $pin.borrow().floating()
    };
}

macro_rules! set {
    ($($pin:expr),* $(,)?) => {
        $($pin.borrow_mut().write($crate::state::HIGH);)*
    };
}

macro_rules! clear {
    ($($pin:expr),* $(,)?) => {
        $($pin.borrow_mut().write($crate::state::LOW);)*
    };
}

macro_rules! float {
    ($($pin:expr),* $(,)?) => {
        $(
            {
                let state = $pin.borrow().state();
                $pin.borrow_mut().write($crate::state::all_disconnected(state));
            }
        )*
    };
}

macro_rules! drive {
    ($pin:expr, $value:expr $(,)?) => {
        $pin.borrow_mut().write($crate::state::from_value($value))
    };
}

macro_rules! mode {
    ($pin:expr $(,)?) => {
        $pin.borrow().mode()
    };
}
